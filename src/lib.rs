//! BlueCoin token economics.
//!
//! * [`ledger`]: fungible token balances and allowances over a fixed supply.
//! * [`contracts`]: the time-boxed fixed-price sale and the pay-per-call
//!   calculator, both spending through ledger allowances.
//! * [`runtime`]: the single sequential executor with rollback, plus receipts and
//!   a replayable journal.
//! * [`auth`]: ed25519-signed call envelopes.

pub mod auth;
pub mod config;
pub mod contracts;
pub mod ledger;
pub mod logging;
pub mod runtime;

pub use config::Config;
pub use ledger::{Address, Amount};
pub use runtime::{Call, ErrorKind, ExecError, Runtime};
