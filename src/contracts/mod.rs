use serde::Serialize;

use crate::ledger::{Address, Amount, LedgerEvent};

pub mod calculator;
pub mod sale;

pub use calculator::{Calculator, CalculatorError, Op, COST_PER_CALL_TOKENS};
pub use sale::{Sale, SaleError, SaleState, SALE_DURATION_SECS};

pub const LEDGER_LABEL: &str = "ledger";
pub const SALE_LABEL: &str = "sale";
pub const CALCULATOR_LABEL: &str = "calculator";

/// Seconds since the unix epoch, as supplied by the runtime clock.
pub type Timestamp = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("native balance overflow crediting {0}")]
pub struct ValueOverflow(pub Address);

/// Destination for native value paid out by a contract.
pub trait ValueSink {
    fn credit(&mut self, to: Address, amount: Amount) -> Result<(), ValueOverflow>;
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractEvent {
    Deposit {
        buyer: Address,
        value: Amount,
    },
    Withdraw {
        owner: Address,
        amount: Amount,
    },
    Calculation {
        op: Op,
        caller: Address,
        a: i128,
        b: i128,
        result: i128,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Event {
    Ledger(LedgerEvent),
    Contract(ContractEvent),
}

/// A record emitted during a call, tagged with the emitting contract.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Log {
    pub emitter: Address,
    pub event: Event,
}

impl Log {
    pub fn ledger(emitter: Address, event: LedgerEvent) -> Self {
        Self {
            emitter,
            event: Event::Ledger(event),
        }
    }

    pub fn contract(emitter: Address, event: ContractEvent) -> Self {
        Self {
            emitter,
            event: Event::Contract(event),
        }
    }
}
