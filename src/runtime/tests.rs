use ed25519_dalek::SigningKey;
use rand::{rngs::StdRng, SeedableRng};

use super::*;
use crate::contracts::{ContractEvent, Event, SALE_DURATION_SECS};
use crate::ledger::LedgerEvent;

const TOKEN: Amount = 1_000_000_000_000_000_000;
const PRICE: Amount = 1_000_000_000;
const TWO_WEEKS: u64 = 60 * 60 * 24 * 7 * 2;

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn runtime() -> Runtime {
    Runtime::new(&Config::default()).unwrap()
}

fn sale_addr() -> Address {
    addr(SALE_LABEL)
}

fn calculator_addr() -> Address {
    addr(CALCULATOR_LABEL)
}

fn contract_events(execution: &Execution) -> Vec<ContractEvent> {
    execution
        .logs
        .iter()
        .filter_map(|log| match &log.event {
            Event::Contract(event) => Some(event.clone()),
            Event::Ledger(_) => None,
        })
        .collect()
}

fn kind_of(result: Result<Execution, ExecError>) -> ErrorKind {
    result.unwrap_err().kind()
}

// --- deployment setup -------------------------------------------------------

#[test]
fn owner_is_the_legitimate_owner_of_the_sale() {
    let rt = runtime();
    assert_eq!(rt.sale_owner(), addr("owner"));
    assert_eq!(rt.ledger().owner(), addr("owner"));
}

#[test]
fn initial_supply_is_minted_to_owner() {
    let rt = runtime();
    assert_eq!(rt.balance_of(&addr("owner")), 2_000_000 * TOKEN);
    assert_eq!(rt.ledger().total_supply(), 2_000_000 * TOKEN);
}

#[test]
fn sale_supply_is_delegated_to_the_sale() {
    let rt = runtime();
    assert_eq!(
        rt.allowance(&addr("owner"), &sale_addr()),
        1_000_000 * TOKEN
    );
}

#[test]
fn sale_is_active_for_two_weeks_then_inactive() {
    let mut rt = runtime();
    assert_eq!(rt.sale_state(), SaleState::Active);
    rt.advance_time(TWO_WEEKS - 1);
    assert_eq!(rt.sale_state(), SaleState::Active);
    rt.advance_time(1);
    assert_eq!(rt.sale_state(), SaleState::Inactive);
    assert_eq!(SALE_DURATION_SECS, TWO_WEEKS);
}

// --- buying -----------------------------------------------------------------

#[test]
fn bare_value_send_to_sale_buys_tokens() {
    let mut rt = runtime();
    let before = rt.native_balance_of(&addr("alice"));
    let execution = rt
        .execute(
            addr("alice"),
            Call::SendValue {
                to: sale_addr(),
                value: PRICE,
            },
        )
        .unwrap();
    assert_eq!(execution.output, Output::Tokens(TOKEN));
    assert_eq!(rt.held_value(), PRICE);
    assert_eq!(rt.native_balance_of(&addr("alice")), before - PRICE);
    assert_eq!(
        contract_events(&execution),
        vec![ContractEvent::Deposit {
            buyer: addr("alice"),
            value: PRICE
        }]
    );
}

#[test]
fn buy_tokens_credits_scaled_units() {
    let mut rt = runtime();
    rt.execute(addr("bob"), Call::BuyTokens { value: 5 * PRICE })
        .unwrap();
    assert_eq!(rt.balance_of(&addr("bob")), 5 * TOKEN);
    assert!(rt.ledger().check_supply().is_ok());
}

#[test]
fn non_divisible_value_is_rejected_without_effect() {
    let mut rt = runtime();
    let root = rt.state_root();
    let err = rt
        .execute(addr("bob"), Call::BuyTokens { value: 5 * PRICE + 1 })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonDivisibleAmount);
    assert!(err
        .to_string()
        .contains("The received amount must be divisible by price."));
    assert_eq!(rt.state_root(), root);
    assert_eq!(rt.held_value(), 0);
}

#[test]
fn buying_with_missing_native_funds_is_rejected() {
    let mut rt = runtime();
    assert_eq!(
        kind_of(rt.execute(addr("nobody"), Call::BuyTokens { value: PRICE })),
        ErrorKind::InsufficientNativeBalance
    );
}

#[test]
fn buying_after_expiry_is_rejected_and_refunded() {
    let mut rt = runtime();
    rt.advance_time(TWO_WEEKS);
    let before = rt.native_balance_of(&addr("carol"));
    assert_eq!(
        kind_of(rt.execute(addr("carol"), Call::BuyTokens { value: PRICE })),
        ErrorKind::InactiveSale
    );
    assert_eq!(
        kind_of(rt.execute(
            addr("alice"),
            Call::SendValue {
                to: sale_addr(),
                value: 1000
            }
        )),
        ErrorKind::InactiveSale
    );
    assert_eq!(rt.native_balance_of(&addr("carol")), before);
}

#[test]
fn value_sent_to_non_payable_contracts_is_rejected() {
    let mut rt = runtime();
    for to in [addr(LEDGER_LABEL), calculator_addr()] {
        assert_eq!(
            kind_of(rt.execute(addr("alice"), Call::SendValue { to, value: 1 })),
            ErrorKind::NotPayable
        );
    }
    rt.execute(
        addr("alice"),
        Call::SendValue {
            to: addr("dave"),
            value: 7,
        },
    )
    .unwrap();
    assert_eq!(rt.native_balance_of(&addr("dave")), 7);
}

// --- withdrawing --------------------------------------------------------------

#[test]
fn owner_cannot_withdraw_before_expiry() {
    let mut rt = runtime();
    rt.execute(addr("alice"), Call::BuyTokens { value: PRICE })
        .unwrap();
    assert_eq!(
        kind_of(rt.execute(addr("owner"), Call::WithdrawEther)),
        ErrorKind::ActiveSale
    );
    assert_eq!(
        kind_of(rt.execute(addr("alice"), Call::WithdrawEther)),
        ErrorKind::ActiveSale
    );
}

#[test]
fn owner_withdraws_everything_after_expiry() {
    let mut rt = runtime();
    rt.execute(addr("bob"), Call::BuyTokens { value: PRICE })
        .unwrap();
    rt.advance_time(TWO_WEEKS);

    let owner_before = rt.native_balance_of(&addr("owner"));
    let total_before = rt.native_total();
    let execution = rt.execute(addr("owner"), Call::WithdrawEther).unwrap();
    assert_eq!(execution.output, Output::Withdrawn(PRICE));
    assert_eq!(rt.native_balance_of(&addr("owner")), owner_before + PRICE);
    assert_eq!(rt.held_value(), 0);
    assert_eq!(rt.native_total(), total_before);
    assert_eq!(
        contract_events(&execution),
        vec![ContractEvent::Withdraw {
            owner: addr("owner"),
            amount: PRICE
        }]
    );

    let again = rt.execute(addr("owner"), Call::WithdrawEther).unwrap();
    assert_eq!(again.output, Output::Withdrawn(0));
}

#[test]
fn non_owner_cannot_withdraw_after_expiry() {
    let mut rt = runtime();
    rt.execute(addr("bob"), Call::BuyTokens { value: PRICE })
        .unwrap();
    rt.advance_time(TWO_WEEKS);
    assert_eq!(
        kind_of(rt.execute(addr("bob"), Call::WithdrawEther)),
        ErrorKind::Unauthorized
    );
    assert_eq!(rt.held_value(), PRICE);
}

// --- calculator -------------------------------------------------------------

/// user1..user3 buy 1, 2 and 3 tokens; user2 approves the calculator for one.
fn calculator_runtime() -> Runtime {
    let mut config = Config::default();
    for user in ["user1", "user2", "user3"] {
        config
            .genesis
            .native_balances
            .insert(addr(user), 10 * PRICE);
    }
    let mut rt = Runtime::new(&config).unwrap();
    for (idx, user) in ["user1", "user2", "user3"].into_iter().enumerate() {
        rt.execute(
            addr(user),
            Call::BuyTokens {
                value: (idx as Amount + 1) * PRICE,
            },
        )
        .unwrap();
    }
    rt.execute(
        addr("user2"),
        Call::Approve {
            spender: calculator_addr(),
            amount: TOKEN,
        },
    )
    .unwrap();
    rt
}

#[test]
fn calculator_emits_calculation_and_charges_one_token() {
    let cases = [
        (Op::Add, 3, 2, 5),
        (Op::Sub, 3, 2, 1),
        (Op::Div, 10, 2, 5),
        (Op::Mul, 10, 2, 20),
        (Op::Mod, 11, 2, 1),
    ];
    for (op, a, b, expected) in cases {
        let mut rt = calculator_runtime();
        let owner_before = rt.balance_of(&addr("owner"));
        let execution = rt
            .execute(addr("user2"), Call::Calculate { op, a, b })
            .unwrap();
        assert_eq!(execution.output, Output::Result(expected));
        assert_eq!(
            contract_events(&execution),
            vec![ContractEvent::Calculation {
                op,
                caller: addr("user2"),
                a,
                b,
                result: expected
            }]
        );
        assert_eq!(rt.balance_of(&addr("user2")), TOKEN);
        assert_eq!(rt.allowance(&addr("user2"), &calculator_addr()), 0);
        assert_eq!(rt.balance_of(&addr("owner")), owner_before + TOKEN);
    }
}

#[test]
fn calculator_without_allowance_is_rejected() {
    let mut rt = calculator_runtime();
    let op = Call::Calculate {
        op: Op::Add,
        a: 1,
        b: 1,
    };
    assert_eq!(
        kind_of(rt.execute(addr("user3"), op.clone())),
        ErrorKind::InsufficientAllowance
    );
    assert_eq!(rt.balance_of(&addr("user3")), 3 * TOKEN);

    rt.execute(addr("user2"), op.clone()).unwrap();
    assert_eq!(
        kind_of(rt.execute(addr("user2"), op)),
        ErrorKind::InsufficientAllowance
    );
    assert_eq!(rt.balance_of(&addr("user2")), TOKEN);
}

#[test]
fn calculator_third_call_runs_out_of_balance() {
    let mut rt = calculator_runtime();
    rt.execute(
        addr("user2"),
        Call::Approve {
            spender: calculator_addr(),
            amount: 5 * TOKEN,
        },
    )
    .unwrap();
    let call = Call::Calculate {
        op: Op::Mul,
        a: 6,
        b: 7,
    };
    rt.execute(addr("user2"), call.clone()).unwrap();
    rt.execute(addr("user2"), call.clone()).unwrap();
    let err = rt.execute(addr("user2"), call).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(rt.balance_of(&addr("user2")), 0);
    assert_eq!(rt.allowance(&addr("user2"), &calculator_addr()), 3 * TOKEN);
}

#[test]
fn calculator_reports_payment_errors_before_arithmetic_ones() {
    let mut rt = calculator_runtime();
    let div_by_zero = Call::Calculate {
        op: Op::Div,
        a: 1,
        b: 0,
    };
    assert_eq!(
        kind_of(rt.execute(addr("user3"), div_by_zero.clone())),
        ErrorKind::InsufficientAllowance
    );
    assert_eq!(
        kind_of(rt.execute(addr("user2"), div_by_zero)),
        ErrorKind::DivisionByZero
    );
}

#[test]
fn calculator_arithmetic_failures_charge_nothing() {
    let mut rt = calculator_runtime();
    assert_eq!(
        kind_of(rt.execute(
            addr("user2"),
            Call::Calculate {
                op: Op::Div,
                a: 1,
                b: 0
            }
        )),
        ErrorKind::DivisionByZero
    );
    assert_eq!(
        kind_of(rt.execute(
            addr("user2"),
            Call::Calculate {
                op: Op::Mul,
                a: i128::MAX,
                b: 2
            }
        )),
        ErrorKind::ArithmeticOverflow
    );
    assert_eq!(rt.balance_of(&addr("user2")), 2 * TOKEN);
    assert_eq!(rt.allowance(&addr("user2"), &calculator_addr()), TOKEN);
}

// --- receipts, journal, signatures ------------------------------------------

#[test]
fn every_call_gets_a_receipt_in_order() {
    let mut rt = runtime();
    rt.execute(addr("alice"), Call::BuyTokens { value: PRICE })
        .unwrap();
    let _ = rt.execute(addr("alice"), Call::WithdrawEther);
    let receipts = rt.receipts();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[0].seq, 0);
    assert!(matches!(receipts[0].outcome, Outcome::Accepted(_)));
    assert!(matches!(
        receipts[1].outcome,
        Outcome::Rejected {
            kind: ErrorKind::ActiveSale,
            ..
        }
    ));
    assert!(matches!(
        receipts[0].outcome,
        Outcome::Accepted(Execution { ref logs, .. })
            if logs[0].event == Event::Ledger(LedgerEvent::Transfer {
                from: addr("owner"),
                to: addr("alice"),
                amount: TOKEN,
            })
    ));
}

#[test]
fn replaying_the_journal_reproduces_the_state_root() {
    let mut rt = calculator_runtime();
    rt.execute(
        addr("user2"),
        Call::Calculate {
            op: Op::Sub,
            a: 3,
            b: 2,
        },
    )
    .unwrap();
    let _ = rt.execute(addr("user1"), Call::BuyTokens { value: 3 });
    rt.advance_time(TWO_WEEKS);
    rt.execute(addr("owner"), Call::WithdrawEther).unwrap();

    let mut config = Config::default();
    for user in ["user1", "user2", "user3"] {
        config
            .genesis
            .native_balances
            .insert(addr(user), 10 * PRICE);
    }
    let mut replayed = Runtime::new(&config).unwrap();
    replayed.replay(rt.journal()).unwrap();
    assert_eq!(replayed.state_root(), rt.state_root());
    assert_eq!(replayed.receipts(), rt.receipts());
}

#[test]
fn replay_detects_divergence() {
    let mut rt = runtime();
    rt.execute(addr("alice"), Call::BuyTokens { value: PRICE })
        .unwrap();
    let mut journal = rt.journal().to_vec();
    journal[0].accepted = false;

    let mut replayed = runtime();
    let err = replayed.replay(&journal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReplayDivergence);
}

#[test]
fn zero_amount_transfers_leave_the_state_root_alone() {
    let mut rt = runtime();
    let before = rt.state_root();
    let transfer = rt
        .execute(
            addr("ghost1"),
            Call::Transfer {
                to: addr("ghost2"),
                amount: 0,
            },
        )
        .unwrap();
    assert_eq!(transfer.logs.len(), 1);
    rt.execute(
        addr("ghost3"),
        Call::TransferFrom {
            from: addr("ghost4"),
            to: addr("ghost5"),
            amount: 0,
        },
    )
    .unwrap();
    assert_eq!(rt.state_root(), before);
    assert_eq!(rt.receipts().len(), 2);
}

#[test]
fn clock_never_moves_backwards() {
    let mut rt = runtime();
    let now = rt.now();
    rt.set_time(now + 5).unwrap();
    assert_eq!(
        rt.set_time(now).unwrap_err(),
        ExecError::ClockRewind {
            now: now + 5,
            requested: now
        }
    );
}

#[test]
fn signed_calls_act_for_the_key_holder_and_consume_nonces() {
    let key = SigningKey::generate(&mut StdRng::seed_from_u64(7));
    let holder = Address::from_public_key(&key.verifying_key().to_bytes());
    let mut config = Config::default();
    config.genesis.native_balances.insert(holder, 10 * PRICE);
    let mut rt = Runtime::new(&config).unwrap();
    let deployment = rt.deployment_id();

    let buy =
        SignedCall::sign(&key, &deployment, 0, Call::BuyTokens { value: 2 * PRICE }).unwrap();
    rt.submit(buy.clone()).unwrap();
    assert_eq!(rt.balance_of(&holder), 2 * TOKEN);
    assert_eq!(rt.nonce_of(&holder), 1);

    assert_eq!(kind_of(rt.submit(buy)), ErrorKind::BadNonce);

    // rejected calls still use up their nonce
    let withdraw = SignedCall::sign(&key, &deployment, 1, Call::WithdrawEther).unwrap();
    assert_eq!(kind_of(rt.submit(withdraw)), ErrorKind::ActiveSale);
    assert_eq!(rt.nonce_of(&holder), 2);

    let mut forged = SignedCall::sign(&key, &deployment, 2, Call::WithdrawEther).unwrap();
    forged.call = Call::BuyTokens { value: PRICE };
    assert_eq!(kind_of(rt.submit(forged)), ErrorKind::BadSignature);
    assert_eq!(rt.nonce_of(&holder), 2);

    let mut replayed = Runtime::new(&config).unwrap();
    replayed.replay(rt.journal()).unwrap();
    assert_eq!(replayed.state_root(), rt.state_root());
}

#[test]
fn signed_calls_do_not_carry_over_to_another_deployment() {
    let key = SigningKey::generate(&mut StdRng::seed_from_u64(11));
    let holder = Address::from_public_key(&key.verifying_key().to_bytes());
    let mut config = Config::default();
    config.genesis.native_balances.insert(holder, 10 * PRICE);
    let home = Runtime::new(&config).unwrap();

    config.genesis.timestamp += 1;
    let mut elsewhere = Runtime::new(&config).unwrap();
    assert_ne!(elsewhere.deployment_id(), home.deployment_id());

    let buy = SignedCall::sign(
        &key,
        &home.deployment_id(),
        0,
        Call::BuyTokens { value: PRICE },
    )
    .unwrap();
    assert_eq!(kind_of(elsewhere.submit(buy)), ErrorKind::BadSignature);
    assert_eq!(elsewhere.nonce_of(&holder), 0);
    assert_eq!(elsewhere.balance_of(&holder), 0);
}

#[test]
fn summary_reports_deployment_parameters() {
    let mut rt = runtime();
    rt.execute(addr("alice"), Call::BuyTokens { value: 3 * PRICE })
        .unwrap();
    let summary = rt.summary(&[addr("alice")]);
    assert_eq!(summary.token.symbol, "BLC");
    assert_eq!(summary.token.decimals, 18);
    assert_eq!(summary.sale_opened_at, rt.sale().genesis());
    assert_eq!(summary.sale_closes_at, summary.sale_opened_at + TWO_WEEKS);
    assert_eq!(summary.price_per_token, PRICE);
    assert_eq!(summary.held_value, 3 * PRICE);
    assert_eq!(summary.calculator_beneficiary, addr("owner"));
    assert_eq!(summary.cost_per_call, rt.calculator().cost_per_call());
    assert_eq!(summary.balances[&addr("alice")], 3 * TOKEN);
    assert_eq!(summary.state_root, hex::encode(rt.state_root()));
}

#[test]
fn custom_beneficiary_receives_calculator_fees() {
    let mut config = Config::default();
    config.calculator.beneficiary = Some(addr("treasury"));
    let mut rt = Runtime::new(&config).unwrap();
    rt.execute(addr("alice"), Call::BuyTokens { value: PRICE })
        .unwrap();
    rt.execute(
        addr("alice"),
        Call::Approve {
            spender: calculator_addr(),
            amount: TOKEN,
        },
    )
    .unwrap();
    rt.execute(
        addr("alice"),
        Call::Calculate {
            op: Op::Add,
            a: 1,
            b: 2,
        },
    )
    .unwrap();
    assert_eq!(rt.balance_of(&addr("treasury")), TOKEN);
    assert!(rt.ledger().check_supply().is_ok());
}
