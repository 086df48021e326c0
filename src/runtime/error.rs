use serde::{Deserialize, Serialize};

use crate::auth::VerificationError;
use crate::contracts::{CalculatorError, SaleError, Timestamp, ValueOverflow};
use crate::ledger::{Address, Amount, LedgerError};

/// Flat rejection taxonomy callers can assert on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    InactiveSale,
    ActiveSale,
    NonDivisibleAmount,
    Unauthorized,
    InsufficientAllowance,
    InsufficientBalance,
    DivisionByZero,
    ArithmeticOverflow,
    InsufficientNativeBalance,
    NotPayable,
    ClockRewind,
    BadNonce,
    BadSignature,
    ReplayDivergence,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Sale(#[from] SaleError),
    #[error(transparent)]
    Calculator(#[from] CalculatorError),
    #[error(transparent)]
    Auth(#[from] VerificationError),
    #[error(transparent)]
    NativeOverflow(#[from] ValueOverflow),
    #[error("insufficient native balance: account {account} holds {available}, needs {needed}")]
    InsufficientNativeBalance {
        account: Address,
        available: Amount,
        needed: Amount,
    },
    #[error("{to} does not accept native value")]
    NotPayable { to: Address },
    #[error("clock cannot move back from {now} to {requested}")]
    ClockRewind {
        now: Timestamp,
        requested: Timestamp,
    },
    #[error("bad nonce for {caller}: expected {expected}, got {got}")]
    BadNonce {
        caller: Address,
        expected: u64,
        got: u64,
    },
    #[error("journal entry {seq} was {recorded} when recorded but {replayed} on replay")]
    ReplayDivergence {
        seq: u64,
        recorded: &'static str,
        replayed: &'static str,
    },
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Ledger(err) => ledger_kind(err),
            ExecError::Sale(err) => match err {
                SaleError::InactiveSale => ErrorKind::InactiveSale,
                SaleError::ActiveSale => ErrorKind::ActiveSale,
                SaleError::NonDivisibleAmount { .. } => ErrorKind::NonDivisibleAmount,
                SaleError::Unauthorized { .. } => ErrorKind::Unauthorized,
                SaleError::Overflow { .. } | SaleError::Payout(_) => ErrorKind::ArithmeticOverflow,
                SaleError::Ledger(err) => ledger_kind(err),
            },
            ExecError::Calculator(err) => match err {
                CalculatorError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
                CalculatorError::ArithmeticOverflow { .. } => ErrorKind::ArithmeticOverflow,
                CalculatorError::Payment(err) => ledger_kind(err),
            },
            ExecError::Auth(_) => ErrorKind::BadSignature,
            ExecError::NativeOverflow(_) => ErrorKind::ArithmeticOverflow,
            ExecError::InsufficientNativeBalance { .. } => ErrorKind::InsufficientNativeBalance,
            ExecError::NotPayable { .. } => ErrorKind::NotPayable,
            ExecError::ClockRewind { .. } => ErrorKind::ClockRewind,
            ExecError::BadNonce { .. } => ErrorKind::BadNonce,
            ExecError::ReplayDivergence { .. } => ErrorKind::ReplayDivergence,
        }
    }
}

fn ledger_kind(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
        LedgerError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
        LedgerError::BalanceOverflow { .. } | LedgerError::SupplyOverflow { .. } => {
            ErrorKind::ArithmeticOverflow
        }
    }
}
