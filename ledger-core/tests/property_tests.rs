//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants over random
//! histories of calls and adjustments:
//! - Conservation: initial + Σ(credits) − Σ(success costs) == balance
//! - Snapshot replay: each `balance_after` follows from the previous record
//! - Hash self-consistency: every record reproduces its own digest
//! - Block-before-spend: blocked records cost nothing and never execute

use ledger_core::{
    AuditDraft, AuditFilter, AuditRecord, AuditStatus, Charge, Config, Ledger, MemoryStorage,
    RequestType,
};
use proptest::prelude::*;
use risk_engine::{RiskAssessor, RiskThresholds};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// One step of a random history
#[derive(Debug, Clone)]
enum Op {
    /// External call: estimate, actual billed cost, whether upstream fails
    Call {
        estimate: Decimal,
        actual: Decimal,
        upstream_fails: bool,
    },
    /// Admin sets the balance to a target
    SetBalance(Decimal),
    /// Admin adds (or removes) an amount
    Credit(Decimal),
}

/// Strategy for generating amounts (two decimal places)
fn amount_strategy(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0i64..max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (amount_strategy(600), amount_strategy(600), prop::bool::weighted(0.2)).prop_map(
            |(estimate, actual, upstream_fails)| Op::Call {
                estimate,
                actual,
                upstream_fails,
            }
        ),
        1 => amount_strategy(2_000).prop_map(Op::SetBalance),
        1 => (-500i64..500i64).prop_map(|cents| Op::Credit(Decimal::new(cents, 2))),
    ]
}

/// Create test ledger over in-memory storage
async fn create_test_ledger(initial: Decimal) -> Ledger {
    let config = Config {
        initial_budget: initial,
        ..Config::default()
    };
    Ledger::with_storage(config, Arc::new(MemoryStorage::new()))
        .await
        .unwrap()
}

/// What applying a history did
#[derive(Debug, Default)]
struct Applied {
    /// External calls that reached execution
    executed: usize,
    /// Withdrawals refused because they would overdraw
    refused: usize,
}

/// Apply a history
async fn run_history(ledger: &Ledger, assessor: &RiskAssessor, ops: &[Op]) -> Applied {
    let mut applied = Applied::default();

    for op in ops {
        let draft = match op.clone() {
            Op::Call {
                estimate,
                actual,
                upstream_fails,
            } => {
                let admission = ledger.admit(estimate, assessor).await.unwrap();
                if !admission.is_admitted() {
                    let draft = AuditDraft::blocked(Uuid::now_v7(), "u", "u", "p", admission.assessment);
                    ledger.debit_and_commit(draft).await.unwrap();
                    continue;
                }

                applied.executed += 1;
                let draft = if upstream_fails {
                    AuditDraft::failed(Uuid::now_v7(), "u", "u", "p", "timeout", admission.assessment.clone())
                } else {
                    AuditDraft::success(Uuid::now_v7(), "u", "u", "p", "r", actual, admission.assessment.clone())
                };
                ledger.commit_reserved(draft, admission.reservation).await.unwrap();
                continue;
            }
            Op::SetBalance(target) => {
                AuditDraft::adjustment(Uuid::now_v7(), "admin", Charge::SetBalance(target), "")
            }
            Op::Credit(delta) => {
                let draft = AuditDraft::adjustment(Uuid::now_v7(), "admin", Charge::Debit(-delta), "");
                let before = ledger.read_balance().unwrap().remaining_budget;
                match ledger.debit_and_commit(draft).await {
                    Ok(record) => {
                        assert!(delta >= Decimal::ZERO || record.balance_after >= Decimal::ZERO);
                    }
                    // Refused withdrawals write nothing
                    Err(ledger_core::Error::Overdraw { balance, .. }) => {
                        assert!(delta < Decimal::ZERO);
                        assert_eq!(balance, before);
                        assert_eq!(ledger.read_balance().unwrap().remaining_budget, before);
                        applied.refused += 1;
                    }
                    Err(e) => panic!("adjustment failed: {}", e),
                }
                continue;
            }
        };
        ledger.debit_and_commit(draft).await.unwrap();
    }

    applied
}

fn all_records(ledger: &Ledger) -> Vec<AuditRecord> {
    ledger.trail().query(&AuditFilter::all().ascending()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: balance equals initial budget plus credits minus billed costs
    #[test]
    fn prop_conservation(
        initial in amount_strategy(1_000),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger(initial).await;
            let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();
            let applied = run_history(&ledger, &assessor, &ops).await;

            let records = all_records(&ledger);
            prop_assert_eq!(records.len(), ops.len() - applied.refused);

            let credits: Decimal = records
                .iter()
                .filter(|r| r.request_type == RequestType::AdminAdjustment)
                .map(|r| -r.cost)
                .sum();
            let spent: Decimal = records
                .iter()
                .filter(|r| r.request_type == RequestType::ExternalCall && r.status == AuditStatus::Success)
                .map(|r| r.cost)
                .sum();

            let balance = ledger.read_balance().unwrap().remaining_budget;
            prop_assert_eq!(initial + credits - spent, balance);
            prop_assert!(ledger.verify().unwrap().is_clean());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: replaying records in id order reproduces every snapshot
    #[test]
    fn prop_snapshot_replay(
        initial in amount_strategy(1_000),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger(initial).await;
            let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();
            run_history(&ledger, &assessor, &ops).await;

            let mut running = initial;
            for (i, record) in all_records(&ledger).iter().enumerate() {
                prop_assert_eq!(record.id, i as u64 + 1);
                running -= record.cost;
                prop_assert_eq!(record.balance_after, running);
            }
            prop_assert_eq!(running, ledger.read_balance().unwrap().remaining_budget);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: every stored record reproduces its integrity hash
    #[test]
    fn prop_hash_self_consistency(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger(Decimal::from(10)).await;
            let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();
            run_history(&ledger, &assessor, &ops).await;

            for record in all_records(&ledger) {
                prop_assert!(record.verify_integrity().unwrap());
                prop_assert_eq!(record.integrity_hash.len(), 64);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: blocked requests are never executed and never charged
    #[test]
    fn prop_block_before_spend(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ledger = create_test_ledger(Decimal::from(10)).await;
            let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();
            let executed = run_history(&ledger, &assessor, &ops).await.executed;

            let records = all_records(&ledger);
            let calls = records.iter().filter(|r| r.request_type == RequestType::ExternalCall);
            let mut blocked = 0;
            for record in calls {
                let risk = record.risk.as_ref().unwrap();
                if record.status == AuditStatus::Blocked {
                    blocked += 1;
                    prop_assert_eq!(record.cost, Decimal::ZERO);
                    prop_assert!(!risk.is_admitted());
                } else {
                    prop_assert!(risk.is_admitted());
                }
                if record.status == AuditStatus::Error {
                    prop_assert_eq!(record.cost, Decimal::ZERO);
                }
            }

            let call_count = ops.iter().filter(|op| matches!(op, Op::Call { .. })).count();
            prop_assert_eq!(executed + blocked, call_count);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_reference_scenario() {
        let ledger = create_test_ledger(Decimal::from(10)).await;
        let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();

        // 0.05 admitted
        let admission = ledger.admit(Decimal::new(5, 2), &assessor).await.unwrap();
        let draft = AuditDraft::success(
            Uuid::now_v7(),
            "alice",
            "alice",
            "hello",
            "",
            Decimal::new(5, 2),
            admission.assessment.clone(),
        );
        ledger.commit_reserved(draft, admission.reservation).await.unwrap();
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::new(995, 2));

        // Would reach 100.5%
        let admission = ledger.admit(Decimal::new(10, 2), &assessor).await.unwrap();
        assert!(!admission.is_admitted());
        assert_eq!(admission.assessment.budget_impact_percent, Decimal::new(1005, 1));
        let draft = AuditDraft::blocked(Uuid::now_v7(), "alice", "alice", "x", admission.assessment);
        let blocked = ledger.debit_and_commit(draft).await.unwrap();
        assert_eq!(blocked.cost, Decimal::ZERO);
        assert_eq!(blocked.balance_after, Decimal::new(995, 2));

        // Admin target 1000
        let draft = AuditDraft::adjustment(
            Uuid::now_v7(),
            "admin",
            Charge::SetBalance(Decimal::from(1000)),
            "approved",
        );
        let adjustment = ledger.debit_and_commit(draft).await.unwrap();
        assert_eq!(adjustment.balance_after, Decimal::from(1000));
        assert!(adjustment.input.contains("delta=+990.05"));

        let records = ledger.trail().query(&AuditFilter::all()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(ledger.verify().unwrap().is_clean());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let storage = Arc::new(MemoryStorage::new());
        let config = Config {
            initial_budget: Decimal::from(10),
            ..Config::default()
        };
        let ledger = Ledger::with_storage(config, storage.clone()).await.unwrap();
        let assessor = RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap();

        let admission = ledger.admit(Decimal::ONE, &assessor).await.unwrap();
        storage.inject_commit_failure(true);

        let draft = AuditDraft::success(
            Uuid::now_v7(),
            "alice",
            "alice",
            "in",
            "out",
            Decimal::ONE,
            admission.assessment.clone(),
        );
        let err = ledger.commit_reserved(draft, admission.reservation).await.unwrap_err();
        assert!(err.is_persistence());

        assert_eq!(storage.record_count(), 0);
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::from(10));
        assert_eq!(ledger.metrics().persistence_failures.get(), 1);

        // The reservation is gone, so the full balance is available again
        let status = ledger.writer_status().await.unwrap();
        assert_eq!(status.reserved, Decimal::ZERO);

        ledger.shutdown().await.unwrap();
    }
}
