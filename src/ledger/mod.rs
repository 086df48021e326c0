use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

mod address;

pub use address::{Address, AddressParseError};

/// Token minor units (wei-style, `10^decimals` per whole token).
pub type Amount = u128;

pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance: account {account} holds {available}, needs {needed}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        needed: Amount,
    },
    #[error(
        "insufficient allowance: {spender} may spend {available} of {owner}'s tokens, needs {needed}"
    )]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        available: Amount,
        needed: Amount,
    },
    #[error("balance overflow crediting account {account}")]
    BalanceOverflow { account: Address },
    #[error("initial supply of {supply} tokens overflows at {decimals} decimals")]
    SupplyOverflow { supply: Amount, decimals: u8 },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "BlueCoin".to_string(),
            symbol: "BLC".to_string(),
            decimals: DEFAULT_DECIMALS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    pub balance: Amount,
    /// Remaining amount each spender may pull from this account.
    pub allowances: BTreeMap<Address, Amount>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub metadata: TokenMetadata,
    pub owner: Address,
    pub total_supply: Amount,
    pub accounts: BTreeMap<Address, Account>,
    #[serde(with = "crate::auth::serde_hex32")]
    pub merkle_root: [u8; 32],
}

/// Fungible-unit account book. Supply is fixed at genesis.
#[derive(Clone, Debug)]
pub struct Ledger {
    address: Address,
    owner: Address,
    metadata: TokenMetadata,
    total_supply: Amount,
    accounts: BTreeMap<Address, Account>,
}

impl Ledger {
    /// Mints `initial_supply` whole tokens to `owner`.
    pub fn genesis(
        address: Address,
        owner: Address,
        metadata: TokenMetadata,
        initial_supply: Amount,
    ) -> Result<Self, LedgerError> {
        let overflow = || LedgerError::SupplyOverflow {
            supply: initial_supply,
            decimals: metadata.decimals,
        };
        let unit = 10u128
            .checked_pow(u32::from(metadata.decimals))
            .ok_or_else(overflow)?;
        let total_supply = initial_supply.checked_mul(unit).ok_or_else(overflow)?;

        let mut accounts = BTreeMap::new();
        accounts.insert(
            owner,
            Account {
                balance: total_supply,
                allowances: BTreeMap::new(),
            },
        );
        debug!(ledger = %address, owner = %owner, total_supply, "ledger genesis");
        Ok(Self {
            address,
            owner,
            metadata,
            total_supply,
            accounts,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Minor units in one whole token.
    pub fn unit(&self) -> Amount {
        // bounded by the checked_pow in genesis
        10u128.pow(u32::from(self.metadata.decimals))
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.accounts.get(account).map_or(0, |a| a.balance)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.accounts
            .get(owner)
            .and_then(|a| a.allowances.get(spender).copied())
            .unwrap_or(0)
    }

    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.ensure_balance(&from, amount)?;
        self.move_balance(from, to, amount)?;
        debug!(from = %from, to = %to, amount, "transfer");
        Ok(LedgerEvent::Transfer { from, to, amount })
    }

    /// Sets (not adds to) the amount `spender` may pull from `owner`.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> LedgerEvent {
        self.accounts
            .entry(owner)
            .or_default()
            .allowances
            .insert(spender, amount);
        debug!(owner = %owner, spender = %spender, amount, "approve");
        LedgerEvent::Approval {
            owner,
            spender,
            amount,
        }
    }

    /// Pull-transfer: `spender` moves `amount` out of `from` using its allowance.
    /// The allowance is checked before the balance.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.check_pull(&spender, &from, amount)?;
        self.move_balance(from, to, amount)?;
        if amount > 0 {
            let remaining = self.allowance(&from, &spender) - amount;
            self.accounts
                .entry(from)
                .or_default()
                .allowances
                .insert(spender, remaining);
        }
        debug!(spender = %spender, from = %from, to = %to, amount, "transfer_from");
        Ok(LedgerEvent::Transfer { from, to, amount })
    }

    /// Fails exactly when `transfer_from(spender, from, _, amount)` would.
    pub fn check_pull(
        &self,
        spender: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                available: allowed,
                needed: amount,
            });
        }
        self.ensure_balance(from, amount)
    }

    /// Returns the sum of all balances when it matches the total supply.
    pub fn check_supply(&self) -> Result<Amount, Amount> {
        let sum = self
            .accounts
            .values()
            .try_fold(0u128, |acc, a| acc.checked_add(a.balance))
            .unwrap_or(Amount::MAX);
        if sum == self.total_supply {
            Ok(sum)
        } else {
            Err(sum)
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            metadata: self.metadata.clone(),
            owner: self.owner,
            total_supply: self.total_supply,
            accounts: self.accounts.clone(),
            merkle_root: self.merkle_root(),
        }
    }

    pub fn merkle_root(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();
        for (address, account) in &self.accounts {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(address.as_bytes());
            hasher.update(account.balance.to_le_bytes());
            leaves.push(hasher.finalize().into());
            for (spender, amount) in &account.allowances {
                let mut hasher = Sha256::new();
                hasher.update(b"allow");
                hasher.update(address.as_bytes());
                hasher.update(spender.as_bytes());
                hasher.update(amount.to_le_bytes());
                leaves.push(hasher.finalize().into());
            }
        }
        build_merkle(leaves)
    }

    fn ensure_balance(&self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                available,
                needed: amount,
            });
        }
        Ok(())
    }

    /// Caller has checked that `from` holds at least `amount`.
    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let new_from = self.balance_of(&from) - amount;
        let new_to = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account: to })?;
        self.accounts.entry(from).or_default().balance = new_from;
        self.accounts.entry(to).or_default().balance = new_to;
        Ok(())
    }
}

/// Pairwise sha256 tree. Each node commits to its level; an odd node out is
/// carried up unchanged.
pub(crate) fn build_merkle(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    if level.is_empty() {
        return Sha256::digest(b"blueico-empty").into();
    }
    let mut height: u32 = 0;
    while level.len() > 1 {
        height += 1;
        level = level
            .chunks(2)
            .map(|pair| match pair.get(1) {
                Some(right) => {
                    let mut hasher = Sha256::new();
                    hasher.update(b"blueico-node");
                    hasher.update(height.to_le_bytes());
                    hasher.update(pair[0]);
                    hasher.update(right);
                    hasher.finalize().into()
                }
                None => pair[0],
            })
            .collect();
    }
    level[0]
}
