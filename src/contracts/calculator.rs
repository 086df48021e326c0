use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ContractEvent, Log};
use crate::ledger::{Address, Amount, Ledger, LedgerError};

/// Whole tokens charged for every operation.
pub const COST_PER_CALL_TOKENS: Amount = 1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Mod => "mod",
        }
    }

    pub fn apply(self, a: i128, b: i128) -> Result<i128, CalculatorError> {
        if matches!(self, Op::Div | Op::Mod) && b == 0 {
            return Err(CalculatorError::DivisionByZero { op: self });
        }
        let result = match self {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div => a.checked_div(b),
            Op::Mod => a.checked_rem(b),
        };
        result.ok_or(CalculatorError::ArithmeticOverflow { op: self, a, b })
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalculatorError {
    #[error("Calculator: {op} by zero")]
    DivisionByZero { op: Op },
    #[error("Calculator: {op}({a}, {b}) overflows")]
    ArithmeticOverflow { op: Op, a: i128, b: i128 },
    #[error("Calculator: payment failed: {0}")]
    Payment(#[from] LedgerError),
}

/// Arithmetic service charging one token per call through the caller's allowance.
#[derive(Clone, Debug)]
pub struct Calculator {
    address: Address,
    beneficiary: Address,
    cost_per_call: Amount,
}

impl Calculator {
    /// Without an explicit beneficiary, fees go to the token owner.
    pub fn deploy(address: Address, ledger: &Ledger, beneficiary: Option<Address>) -> Self {
        let beneficiary = beneficiary.unwrap_or_else(|| ledger.owner());
        debug!(calculator = %address, beneficiary = %beneficiary, "calculator deployed");
        Self {
            address,
            beneficiary,
            cost_per_call: COST_PER_CALL_TOKENS * ledger.unit(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    pub fn cost_per_call(&self) -> Amount {
        self.cost_per_call
    }

    /// The fee is checked before the operation runs, so a caller who cannot
    /// pay sees the payment error even for an invalid operation. Nothing is
    /// charged unless the operation succeeds.
    pub fn call(
        &self,
        ledger: &mut Ledger,
        caller: Address,
        op: Op,
        a: i128,
        b: i128,
        logs: &mut Vec<Log>,
    ) -> Result<i128, CalculatorError> {
        ledger.check_pull(&self.address, &caller, self.cost_per_call)?;
        let result = op.apply(a, b)?;
        let payment =
            ledger.transfer_from(self.address, caller, self.beneficiary, self.cost_per_call)?;

        logs.push(Log::ledger(ledger.address(), payment));
        logs.push(Log::contract(
            self.address,
            ContractEvent::Calculation {
                op,
                caller,
                a,
                b,
                result,
            },
        ));
        debug!(caller = %caller, op = %op, a, b, result, "calculation");
        Ok(result)
    }
}
