use std::num::NonZeroU128;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ContractEvent, Log, Timestamp, ValueOverflow, ValueSink};
use crate::ledger::{Address, Amount, Ledger, LedgerError};

/// Fixed sale window: two weeks from deployment.
pub const SALE_DURATION_SECS: u64 = 60 * 60 * 24 * 7 * 2;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    Inactive = 0,
    Active = 1,
}

impl SaleState {
    pub fn at(now: Timestamp, genesis: Timestamp) -> Self {
        if now < genesis.saturating_add(SALE_DURATION_SECS) {
            SaleState::Active
        } else {
            SaleState::Inactive
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaleError {
    #[error("BlueICO: This operation is reserved for active contracts.")]
    InactiveSale,
    #[error("BlueICO: This operation is reserved for inactive contracts.")]
    ActiveSale,
    #[error(
        "BlueICO: Contract doesn't give back change. The received amount must be divisible by price. (value {value}, price {price})"
    )]
    NonDivisibleAmount { value: Amount, price: Amount },
    #[error("BlueICO: {caller} is not the owner")]
    Unauthorized { caller: Address },
    #[error("BlueICO: purchase of {value} overflows")]
    Overflow { value: Amount },
    #[error(transparent)]
    Payout(#[from] ValueOverflow),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fixed-price sale of ledger units drawn from the owner's allowance.
#[derive(Clone, Debug)]
pub struct Sale {
    address: Address,
    owner: Address,
    genesis: Timestamp,
    price_per_token: NonZeroU128,
    held_value: Amount,
}

impl Sale {
    /// The sale is owned by whoever owns the token it sells.
    pub fn deploy(
        address: Address,
        ledger: &Ledger,
        genesis: Timestamp,
        price_per_token: NonZeroU128,
    ) -> Self {
        debug!(sale = %address, owner = %ledger.owner(), genesis, "sale deployed");
        Self {
            address,
            owner: ledger.owner(),
            genesis,
            price_per_token,
            held_value: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn genesis(&self) -> Timestamp {
        self.genesis
    }

    pub fn closes_at(&self) -> Timestamp {
        self.genesis.saturating_add(SALE_DURATION_SECS)
    }

    pub fn price_per_token(&self) -> Amount {
        self.price_per_token.get()
    }

    pub fn held_value(&self) -> Amount {
        self.held_value
    }

    /// Recomputed on every read.
    pub fn state(&self, now: Timestamp) -> SaleState {
        SaleState::at(now, self.genesis)
    }

    /// Ledger units bought by `value`; refuses anything that would need change.
    pub fn quote(&self, ledger: &Ledger, value: Amount) -> Result<Amount, SaleError> {
        let price = self.price_per_token.get();
        if value % price != 0 {
            return Err(SaleError::NonDivisibleAmount { value, price });
        }
        (value / price)
            .checked_mul(ledger.unit())
            .ok_or(SaleError::Overflow { value })
    }

    /// Handles value arriving from `buyer`, whether through a call or a bare send.
    /// The value itself has already been moved off the buyer by the caller.
    pub fn purchase(
        &mut self,
        ledger: &mut Ledger,
        buyer: Address,
        value: Amount,
        now: Timestamp,
        logs: &mut Vec<Log>,
    ) -> Result<Amount, SaleError> {
        if self.state(now) != SaleState::Active {
            return Err(SaleError::InactiveSale);
        }
        let units = self.quote(ledger, value)?;
        let held = self
            .held_value
            .checked_add(value)
            .ok_or(SaleError::Overflow { value })?;

        self.held_value = held;
        let transfer = match ledger.transfer_from(self.address, self.owner, buyer, units) {
            Ok(event) => event,
            Err(err) => {
                self.held_value -= value;
                return Err(err.into());
            }
        };

        logs.push(Log::ledger(ledger.address(), transfer));
        logs.push(Log::contract(
            self.address,
            ContractEvent::Deposit { buyer, value },
        ));
        debug!(buyer = %buyer, value, units, "deposit");
        Ok(units)
    }

    /// Drains everything held to the owner once the sale has closed.
    pub fn withdraw(
        &mut self,
        caller: Address,
        now: Timestamp,
        sink: &mut dyn ValueSink,
        logs: &mut Vec<Log>,
    ) -> Result<Amount, SaleError> {
        if self.state(now) != SaleState::Inactive {
            return Err(SaleError::ActiveSale);
        }
        if caller != self.owner {
            return Err(SaleError::Unauthorized { caller });
        }

        let amount = self.held_value;
        self.held_value = 0;
        if let Err(err) = sink.credit(self.owner, amount) {
            self.held_value = amount;
            return Err(err.into());
        }

        logs.push(Log::contract(
            self.address,
            ContractEvent::Withdraw {
                owner: self.owner,
                amount,
            },
        ));
        info!(owner = %self.owner, amount, "withdraw");
        Ok(amount)
    }
}
