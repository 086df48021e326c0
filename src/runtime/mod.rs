//! Single sequential executor over the ledger, the sale and the calculator.
//!
//! Every call runs to completion before the next one starts. The world is
//! checkpointed before a call and restored if the call fails, so a rejected
//! call leaves no trace besides its receipt. Time only moves when the owner of
//! the [`Runtime`] says so.

use std::collections::BTreeMap;
use std::num::NonZeroU128;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::auth::{DeploymentId, SignedCall};
use crate::config::{Config, ConfigError};
use crate::contracts::{
    Calculator, Log, Op, Sale, SaleState, Timestamp, ValueSink, CALCULATOR_LABEL, LEDGER_LABEL,
    SALE_LABEL,
};
use crate::ledger::{build_merkle, Address, Amount, Ledger, TokenMetadata};

mod error;
mod native;

pub use error::{ErrorKind, ExecError};
pub use native::NativeBalances;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Transfer {
        to: Address,
        amount: Amount,
    },
    Approve {
        spender: Address,
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        amount: Amount,
    },
    BuyTokens {
        value: Amount,
    },
    /// Bare native transfer; sending to the sale buys tokens.
    SendValue {
        to: Address,
        value: Amount,
    },
    WithdrawEther,
    Calculate {
        op: Op,
        a: i128,
        b: i128,
    },
}

impl Call {
    /// Native value attached to the call.
    pub fn value(&self) -> Amount {
        match self {
            Call::BuyTokens { value } | Call::SendValue { value, .. } => *value,
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    None,
    Tokens(Amount),
    Withdrawn(Amount),
    Result(i128),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Execution {
    pub output: Output,
    pub logs: Vec<Log>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted(Execution),
    Rejected { kind: ErrorKind, reason: String },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Receipt {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub caller: Address,
    pub call: Call,
    pub outcome: Outcome,
}

/// What is needed to re-execute a call deterministically.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub caller: Address,
    #[serde(default)]
    pub nonce: Option<u64>,
    pub call: Call,
    pub accepted: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub now: Timestamp,
    pub token: TokenMetadata,
    pub sale_state: SaleState,
    pub sale_opened_at: Timestamp,
    pub sale_closes_at: Timestamp,
    pub price_per_token: Amount,
    pub held_value: Amount,
    pub calculator_beneficiary: Address,
    pub cost_per_call: Amount,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub native_balances: BTreeMap<Address, Amount>,
    pub receipts: usize,
    pub state_root: String,
}

/// All state a call may touch. Cloned as the rollback checkpoint.
#[derive(Clone, Debug)]
struct World {
    ledger: Ledger,
    sale: Sale,
    calculator: Calculator,
    native: NativeBalances,
}

impl World {
    fn apply(
        &mut self,
        caller: Address,
        call: &Call,
        now: Timestamp,
        logs: &mut Vec<Log>,
    ) -> Result<Output, ExecError> {
        let value = call.value();
        if value > 0 {
            self.native.debit(caller, value)?;
        }

        let output = match call {
            Call::Transfer { to, amount } => {
                let event = self.ledger.transfer(caller, *to, *amount)?;
                logs.push(Log::ledger(self.ledger.address(), event));
                Output::None
            }
            Call::Approve { spender, amount } => {
                let event = self.ledger.approve(caller, *spender, *amount);
                logs.push(Log::ledger(self.ledger.address(), event));
                Output::None
            }
            Call::TransferFrom { from, to, amount } => {
                let event = self.ledger.transfer_from(caller, *from, *to, *amount)?;
                logs.push(Log::ledger(self.ledger.address(), event));
                Output::None
            }
            Call::BuyTokens { value } => Output::Tokens(self.sale.purchase(
                &mut self.ledger,
                caller,
                *value,
                now,
                logs,
            )?),
            Call::SendValue { to, value } => self.send_value(caller, *to, *value, now, logs)?,
            Call::WithdrawEther => {
                Output::Withdrawn(self.sale.withdraw(caller, now, &mut self.native, logs)?)
            }
            Call::Calculate { op, a, b } => Output::Result(self.calculator.call(
                &mut self.ledger,
                caller,
                *op,
                *a,
                *b,
                logs,
            )?),
        };
        Ok(output)
    }

    fn send_value(
        &mut self,
        caller: Address,
        to: Address,
        value: Amount,
        now: Timestamp,
        logs: &mut Vec<Log>,
    ) -> Result<Output, ExecError> {
        if to == self.sale.address() {
            let units = self
                .sale
                .purchase(&mut self.ledger, caller, value, now, logs)?;
            return Ok(Output::Tokens(units));
        }
        if to == self.ledger.address() || to == self.calculator.address() {
            return Err(ExecError::NotPayable { to });
        }
        self.native.credit(to, value)?;
        Ok(Output::None)
    }

    fn state_root(&self, nonces: &BTreeMap<Address, u64>) -> [u8; 32] {
        let mut sale = Sha256::new();
        sale.update(b"sale");
        sale.update(self.sale.held_value().to_le_bytes());

        let mut nonce_hasher = Sha256::new();
        nonce_hasher.update(b"nonces");
        for (account, nonce) in nonces {
            nonce_hasher.update(account.as_bytes());
            nonce_hasher.update(nonce.to_le_bytes());
        }

        build_merkle(vec![
            self.ledger.merkle_root(),
            self.native.digest(),
            sale.finalize().into(),
            nonce_hasher.finalize().into(),
        ])
    }
}

pub struct Runtime {
    world: World,
    deployment: DeploymentId,
    now: Timestamp,
    nonces: BTreeMap<Address, u64>,
    receipts: Vec<Receipt>,
    journal: Vec<JournalEntry>,
}

impl Runtime {
    /// Builds the genesis world: mints the supply, deploys both contracts and
    /// records the owner's approval of the sale allowance.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let price = NonZeroU128::new(config.sale.price_per_token)
            .ok_or_else(|| ConfigError::Invalid("sale.price_per_token must be > 0".into()))?;
        let genesis = config.genesis.timestamp;
        let owner = config.genesis.owner;

        let mut ledger = Ledger::genesis(
            Address::from_label(LEDGER_LABEL),
            owner,
            config.token.metadata(),
            config.token.initial_supply,
        )?;
        let sale = Sale::deploy(Address::from_label(SALE_LABEL), &ledger, genesis, price);
        let calculator = Calculator::deploy(
            Address::from_label(CALCULATOR_LABEL),
            &ledger,
            config.calculator.beneficiary,
        );
        let sale_allowance = config
            .sale
            .allowance
            .checked_mul(ledger.unit())
            .ok_or_else(|| ConfigError::Invalid("sale.allowance overflows".into()))?;
        ledger.approve(owner, sale.address(), sale_allowance);
        let deployment = deployment_id(&ledger, &sale, &calculator);

        info!(
            owner = %owner,
            genesis,
            total_supply = ledger.total_supply(),
            sale_allowance,
            "runtime initialized"
        );
        Ok(Self {
            world: World {
                ledger,
                sale,
                calculator,
                native: NativeBalances::new(config.genesis.native_balances.clone()),
            },
            deployment,
            now: genesis,
            nonces: BTreeMap::new(),
            receipts: Vec::new(),
            journal: Vec::new(),
        })
    }

    /// What signed calls must commit to in order to verify here.
    pub fn deployment_id(&self) -> DeploymentId {
        self.deployment
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn set_time(&mut self, timestamp: Timestamp) -> Result<(), ExecError> {
        if timestamp < self.now {
            return Err(ExecError::ClockRewind {
                now: self.now,
                requested: timestamp,
            });
        }
        self.now = timestamp;
        Ok(())
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.now = self.now.saturating_add(seconds);
        debug!(now = self.now, "clock advanced");
    }

    /// Runs one call as `caller`. Failed calls are rolled back in full.
    pub fn execute(&mut self, caller: Address, call: Call) -> Result<Execution, ExecError> {
        self.run(caller, None, call)
    }

    /// Verifies and runs an externally signed call. The nonce is consumed
    /// even when the call itself is rejected.
    pub fn submit(&mut self, signed: SignedCall) -> Result<Execution, ExecError> {
        let caller = signed.verify(&self.deployment)?;
        let expected = self.nonce_of(&caller);
        if signed.nonce != expected {
            return Err(ExecError::BadNonce {
                caller,
                expected,
                got: signed.nonce,
            });
        }
        self.nonces.insert(caller, expected + 1);
        self.run(caller, Some(signed.nonce), signed.call)
    }

    /// Re-executes journal entries at their recorded times.
    pub fn replay(&mut self, entries: &[JournalEntry]) -> Result<(), ExecError> {
        for entry in entries {
            self.set_time(entry.timestamp)?;
            if let Some(nonce) = entry.nonce {
                let expected = self.nonce_of(&entry.caller);
                if nonce != expected {
                    return Err(ExecError::BadNonce {
                        caller: entry.caller,
                        expected,
                        got: nonce,
                    });
                }
                self.nonces.insert(entry.caller, expected + 1);
            }
            let accepted = self
                .run(entry.caller, entry.nonce, entry.call.clone())
                .is_ok();
            if accepted != entry.accepted {
                return Err(ExecError::ReplayDivergence {
                    seq: entry.seq,
                    recorded: outcome_name(entry.accepted),
                    replayed: outcome_name(accepted),
                });
            }
        }
        Ok(())
    }

    fn run(
        &mut self,
        caller: Address,
        nonce: Option<u64>,
        call: Call,
    ) -> Result<Execution, ExecError> {
        let seq = self.journal.len() as u64;
        let checkpoint = self.world.clone();
        let mut logs = Vec::new();
        let result = self.world.apply(caller, &call, self.now, &mut logs);

        let (outcome, result) = match result {
            Ok(output) => {
                debug!(seq, caller = %caller, ?call, "call accepted");
                let execution = Execution { output, logs };
                (Outcome::Accepted(execution.clone()), Ok(execution))
            }
            Err(err) => {
                self.world = checkpoint;
                warn!(seq, caller = %caller, ?call, error = %err, "call rejected");
                (
                    Outcome::Rejected {
                        kind: err.kind(),
                        reason: err.to_string(),
                    },
                    Err(err),
                )
            }
        };

        self.journal.push(JournalEntry {
            seq,
            timestamp: self.now,
            caller,
            nonce,
            call: call.clone(),
            accepted: result.is_ok(),
        });
        self.receipts.push(Receipt {
            seq,
            timestamp: self.now,
            caller,
            call,
            outcome,
        });
        result
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.world.ledger
    }

    pub fn sale(&self) -> &Sale {
        &self.world.sale
    }

    pub fn calculator(&self) -> &Calculator {
        &self.world.calculator
    }

    pub fn sale_state(&self) -> SaleState {
        self.world.sale.state(self.now)
    }

    pub fn sale_owner(&self) -> Address {
        self.world.sale.owner()
    }

    pub fn held_value(&self) -> Amount {
        self.world.sale.held_value()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.world.ledger.balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.world.ledger.allowance(owner, spender)
    }

    pub fn native_balance_of(&self, account: &Address) -> Amount {
        self.world.native.balance_of(account)
    }

    /// Native value in wallets plus what the sale holds.
    pub fn native_total(&self) -> Option<Amount> {
        self.world
            .native
            .total()
            .and_then(|t| t.checked_add(self.world.sale.held_value()))
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn state_root(&self) -> [u8; 32] {
        self.world.state_root(&self.nonces)
    }

    pub fn summary(&self, accounts: &[Address]) -> Summary {
        Summary {
            now: self.now,
            token: self.ledger().metadata().clone(),
            sale_state: self.sale_state(),
            sale_opened_at: self.sale().genesis(),
            sale_closes_at: self.sale().closes_at(),
            price_per_token: self.sale().price_per_token(),
            held_value: self.held_value(),
            calculator_beneficiary: self.calculator().beneficiary(),
            cost_per_call: self.calculator().cost_per_call(),
            total_supply: self.world.ledger.total_supply(),
            balances: accounts
                .iter()
                .map(|a| (*a, self.balance_of(a)))
                .collect(),
            native_balances: accounts
                .iter()
                .map(|a| (*a, self.native_balance_of(a)))
                .collect(),
            receipts: self.receipts.len(),
            state_root: hex::encode(self.state_root()),
        }
    }
}

fn deployment_id(ledger: &Ledger, sale: &Sale, calculator: &Calculator) -> DeploymentId {
    let mut hasher = Sha256::new();
    hasher.update(b"blueico-deployment");
    hasher.update(ledger.address().as_bytes());
    hasher.update(ledger.owner().as_bytes());
    hasher.update(sale.address().as_bytes());
    hasher.update(sale.genesis().to_le_bytes());
    hasher.update(sale.price_per_token().to_le_bytes());
    hasher.update(calculator.address().as_bytes());
    hasher.finalize().into()
}

fn outcome_name(accepted: bool) -> &'static str {
    if accepted {
        "accepted"
    } else {
        "rejected"
    }
}

#[cfg(test)]
mod tests;
