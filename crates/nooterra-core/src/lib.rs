pub mod arbitration;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod gate;
pub mod grant;
pub mod hold;
pub mod idempotency;
pub mod model;
pub mod types;

pub use arbitration::*;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ArbitrationConfig, GateConfig, LedgerConfig, NodeConfig};
pub use constants::*;
pub use error::{HttpClass, NooterraError, Result};
pub use event::*;
pub use gate::*;
pub use grant::*;
pub use hold::*;
pub use idempotency::*;
pub use model::*;
pub use types::*;
