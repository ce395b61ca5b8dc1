//! Named wallet/escrow/holdback operations over [`Store::commit`].
//!
//! Every method here builds one short `LedgerOp` batch and hands it to
//! `commit` in a single call — there is no read-modify-write across two
//! `commit` calls anywhere in this crate, so nothing here can race with
//! itself (§5: cross-entity invariants are enforced inside `commitTx`).

use std::sync::Arc;

use tracing::info;

use nooterra_core::error::Result;
use nooterra_core::event::EventPayload;
use nooterra_core::model::{Agent, Wallet};
use nooterra_core::types::{AgentId, Cents, Currency, StreamId, TenantId};
use nooterra_store::{LedgerOp, Store, TxReceipt};

pub struct LedgerEngine {
    store: Arc<dyn Store>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn wallet(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Wallet> {
        self.store.get_wallet(tenant, agent_id)
    }

    pub fn register_agent(&self, tenant: &TenantId, agent: Agent) -> Result<TxReceipt> {
        let agent_id = agent.agent_id.clone();
        let receipt = self.store.commit(
            tenant,
            vec![
                LedgerOp::AgentUpsert(agent),
                LedgerOp::EventAppend {
                    stream_id: StreamId::new(format!("agent_{agent_id}")),
                    kind: "AGENT_REGISTERED".into(),
                    actor: format!("agent:{agent_id}"),
                    payload: EventPayload::AgentRegistered {
                        agent_id: agent_id.to_string(),
                    },
                },
            ],
        )?;
        info!(%tenant, %agent_id, "agent registered");
        Ok(receipt)
    }

    /// Credits `agent_id`'s available balance. The only money-creation op in
    /// the ledger — everything else moves funds already posted by a prior
    /// credit.
    pub fn credit(
        &self,
        tenant: &TenantId,
        agent_id: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        if amount_cents == 0 {
            return Err(nooterra_core::error::NooterraError::ZeroAmount);
        }
        let receipt = self.store.commit(
            tenant,
            vec![
                LedgerOp::WalletCredit {
                    agent_id: agent_id.clone(),
                    currency,
                    amount_cents,
                },
                LedgerOp::EventAppend {
                    stream_id: StreamId::new(format!("wallet_{agent_id}")),
                    kind: "WALLET_CREDITED".into(),
                    actor: format!("agent:{agent_id}"),
                    payload: EventPayload::WalletCredited {
                        agent_id: agent_id.to_string(),
                        amount_cents,
                        currency: currency.to_string(),
                    },
                },
            ],
        )?;
        info!(%tenant, %agent_id, amount_cents, %currency, "wallet credited");
        Ok(receipt)
    }

    /// Debits `agent_id`'s available balance directly (no escrow leg).
    pub fn debit(
        &self,
        tenant: &TenantId,
        agent_id: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::WalletDebit {
                agent_id: agent_id.clone(),
                currency,
                amount_cents,
            }],
        )
    }

    /// Moves `amount_cents` from `payer`'s available balance into escrow.
    pub fn escrow_lock(
        &self,
        tenant: &TenantId,
        payer: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::EscrowLock {
                agent_id: payer.clone(),
                currency,
                amount_cents,
            }],
        )
    }

    /// Releases escrow from `payer` straight to `payee`'s available balance
    /// (gate `verify(green, holdbackBps=0)` path, §4.3).
    pub fn escrow_release(
        &self,
        tenant: &TenantId,
        payer: &AgentId,
        payee: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::EscrowRelease {
                agent_id: payer.clone(),
                currency,
                amount_cents,
                to_agent_id: payee.clone(),
            }],
        )
    }

    /// Unlocks escrow and credits it back to the payer (gate `verify(red)`
    /// auto-refund path, §4.3).
    pub fn escrow_refund(
        &self,
        tenant: &TenantId,
        payer: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::EscrowRefund {
                agent_id: payer.clone(),
                currency,
                amount_cents,
            }],
        )
    }

    /// Splits an executed gate's escrowed amount into an immediate payee
    /// release and a payee-side holdback (gate `verify(green, holdbackBps>0)`
    /// path, §4.3). `released_cents + heldback_cents` must equal the gate's
    /// escrowed amount; the caller (the gate FSM) computes the split.
    pub fn release_with_holdback(
        &self,
        tenant: &TenantId,
        payer: &AgentId,
        payee: &AgentId,
        currency: Currency,
        released_cents: Cents,
        heldback_cents: Cents,
    ) -> Result<TxReceipt> {
        let mut ops = Vec::new();
        if released_cents > 0 {
            ops.push(LedgerOp::EscrowRelease {
                agent_id: payer.clone(),
                currency,
                amount_cents: released_cents,
                to_agent_id: payee.clone(),
            });
        }
        if heldback_cents > 0 {
            // Escrow moves payer -> payee-available is wrong for the holdback
            // leg: the held portion is escrowed on the payer's side only
            // long enough to become a payee-side heldback balance, so it is
            // released to the payee's available balance and immediately
            // re-placed into that same payee's heldback balance.
            ops.push(LedgerOp::EscrowRelease {
                agent_id: payer.clone(),
                currency,
                amount_cents: heldback_cents,
                to_agent_id: payee.clone(),
            });
            ops.push(LedgerOp::EscrowLock {
                agent_id: payee.clone(),
                currency,
                amount_cents: heldback_cents,
            });
            ops.push(LedgerOp::HoldbackPlace {
                agent_id: payee.clone(),
                currency,
                amount_cents: heldback_cents,
            });
        }
        self.store.commit(tenant, ops)
    }

    /// Releases a payee's heldback balance to available (holdback_release,
    /// §4.4: auto-release or `releaseRatePct == 100` verdict).
    pub fn holdback_release(
        &self,
        tenant: &TenantId,
        payee: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::HoldbackRelease {
                agent_id: payee.clone(),
                currency,
                amount_cents,
            }],
        )
    }

    /// Refunds a payee's heldback balance back to the payer (holdback_refund,
    /// §4.4: `releaseRatePct == 0` verdict).
    pub fn holdback_refund(
        &self,
        tenant: &TenantId,
        payee: &AgentId,
        payer: &AgentId,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<TxReceipt> {
        self.store.commit(
            tenant,
            vec![LedgerOp::HoldbackRefund {
                agent_id: payee.clone(),
                currency,
                amount_cents,
                refund_to_agent_id: payer.clone(),
            }],
        )
    }

    /// Splits a payee's heldback balance proportionally between release and
    /// refund in a single atomic batch (§4.4 intermediate `releaseRatePct`).
    pub fn holdback_split(
        &self,
        tenant: &TenantId,
        payee: &AgentId,
        payer: &AgentId,
        currency: Currency,
        release_cents: Cents,
        refund_cents: Cents,
    ) -> Result<TxReceipt> {
        let mut ops = Vec::new();
        if release_cents > 0 {
            ops.push(LedgerOp::HoldbackRelease {
                agent_id: payee.clone(),
                currency,
                amount_cents: release_cents,
            });
        }
        if refund_cents > 0 {
            ops.push(LedgerOp::HoldbackRefund {
                agent_id: payee.clone(),
                currency,
                amount_cents: refund_cents,
                refund_to_agent_id: payer.clone(),
            });
        }
        self.store.commit(tenant, ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nooterra_core::clock::FixedClock;
    use nooterra_crypto::KeyPair;

    fn engine() -> (LedgerEngine, TenantId) {
        let clock = Arc::new(FixedClock::new(0));
        let signer = Arc::new(KeyPair::generate());
        let store: Arc<dyn Store> =
            Arc::new(nooterra_store::InMemoryStore::open_temp(clock, signer).unwrap());
        (LedgerEngine::new(store), TenantId::new("t1"))
    }

    #[test]
    fn credit_then_escrow_lock_then_release_with_holdback() {
        let (engine, tenant) = engine();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");

        engine.credit(&tenant, &payer, Currency::Usd, 10_000).unwrap();
        engine
            .escrow_lock(&tenant, &payer, Currency::Usd, 10_000)
            .unwrap();
        engine
            .release_with_holdback(&tenant, &payer, &payee, Currency::Usd, 8_000, 2_000)
            .unwrap();

        let payer_wallet = engine.wallet(&tenant, &payer).unwrap();
        let payee_wallet = engine.wallet(&tenant, &payee).unwrap();
        assert_eq!(payer_wallet.balance(Currency::Usd).escrow_locked_cents, 0);
        assert_eq!(payee_wallet.balance(Currency::Usd).available_cents, 8_000);
        assert_eq!(payee_wallet.balance(Currency::Usd).heldback_cents, 2_000);
    }

    #[test]
    fn holdback_release_moves_heldback_to_available() {
        let (engine, tenant) = engine();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        engine.credit(&tenant, &payer, Currency::Usd, 1_000).unwrap();
        engine.escrow_lock(&tenant, &payer, Currency::Usd, 1_000).unwrap();
        engine
            .release_with_holdback(&tenant, &payer, &payee, Currency::Usd, 0, 1_000)
            .unwrap();
        engine
            .holdback_release(&tenant, &payee, Currency::Usd, 1_000)
            .unwrap();
        let payee_wallet = engine.wallet(&tenant, &payee).unwrap();
        assert_eq!(payee_wallet.balance(Currency::Usd).heldback_cents, 0);
        assert_eq!(payee_wallet.balance(Currency::Usd).available_cents, 1_000);
    }
}
