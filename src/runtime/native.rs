use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::ExecError;
use crate::contracts::{ValueOverflow, ValueSink};
use crate::ledger::{Address, Amount};

/// Native currency (wei) held by externally owned accounts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NativeBalances {
    balances: BTreeMap<Address, Amount>,
}

impl NativeBalances {
    pub fn new(balances: BTreeMap<Address, Amount>) -> Self {
        Self { balances }
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
    }

    pub fn debit(&mut self, account: Address, amount: Amount) -> Result<(), ExecError> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(ExecError::InsufficientNativeBalance {
                account,
                available,
                needed: amount,
            });
        }
        self.balances.insert(account, available - amount);
        Ok(())
    }

    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"native");
        for (account, amount) in &self.balances {
            hasher.update(account.as_bytes());
            hasher.update(amount.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl ValueSink for NativeBalances {
    fn credit(&mut self, to: Address, amount: Amount) -> Result<(), ValueOverflow> {
        let updated = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(ValueOverflow(to))?;
        self.balances.insert(to, updated);
        Ok(())
    }
}
