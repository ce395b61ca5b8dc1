use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor-unit (cent) integer amount. Never a floating point.
pub type Cents = u64;

/// Unix epoch milliseconds. Always produced by an injected [`crate::clock::Clock`],
/// never read directly from the wall clock inside business logic.
pub type Timestamp = i64;

/// Basis points, 0..=10_000.
pub type Bps = u32;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(TenantId);
opaque_id!(AgentId);
opaque_id!(GrantId);
opaque_id!(GateId);
opaque_id!(HoldHash);
opaque_id!(CaseId);
opaque_id!(StreamId);
opaque_id!(EventId);
opaque_id!(KeyId);
opaque_id!(PrincipalRef);

/// ISO-4217-like currency tag. Kept closed over the common set the substrate
/// actually settles in, with an escape hatch for anything else a deployment
/// wants the ledger to track (the ledger never converts between currencies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Active,
    Throttled,
    Suspended,
}

impl LifecycleStatus {
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleStatus::Active)
    }
}
