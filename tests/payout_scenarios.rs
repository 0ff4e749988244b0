//! End-to-end payout cycles on the in-memory store and mock ledger
//!
//! Covers:
//! 1. Proportional split
//! 2. Per-user cap without redistribution
//! 3. Minimum payout floor
//! 4. Funding shortfall aborts before any transfer
//! 5. Partial batch failure is isolated
//! 6. Re-running after a partial failure
//! 7. Concurrent cycles never pay a submission twice

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use attention_core::{
    FailureKind, PayoutStatus, SubmissionId, SubmissionStatus, UserId, LAMPORTS_PER_SOL,
};
use attention_payout::PayoutCycle;
use attention_settings::{PayoutSettings, StoredPayoutConfig};
use attention_settlement::{SettlementClient, SettlementConfig};
use attention_store::{MemoryStore, PayoutStore};

// =============================================================================
// HELPERS
// =============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    client: Arc<SettlementClient>,
    cycle: PayoutCycle,
}

fn sol(amount: f64) -> u64 {
    (amount * LAMPORTS_PER_SOL as f64).round() as u64
}

fn harness(balance: u64, budget: f64, max_per_user: f64, min_payout: f64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.set_payout_config(Some(StoredPayoutConfig {
        budget_sol: Some(budget),
        max_per_user_sol: Some(max_per_user),
        min_payout_sol: Some(min_payout),
    }));
    let client = Arc::new(SettlementClient::new(
        SettlementConfig::mock(balance),
        Pubkey::new_unique(),
    ));
    let cycle = PayoutCycle::new(store.clone(), client.clone(), PayoutSettings::default()).unwrap();
    Harness { store, client, cycle }
}

/// A user with a fresh wallet and one approved submission per score
fn payee(store: &MemoryStore, name: &str, scores: &[u64]) -> (UserId, Pubkey, Vec<SubmissionId>) {
    let wallet = Pubkey::new_unique();
    let user = store.insert_user(&wallet.to_string(), name);
    let subs = scores
        .iter()
        .map(|score| store.insert_submission(user, *score, SubmissionStatus::Approved))
        .collect();
    (user, wallet, subs)
}

fn transferred_to(client: &SettlementClient, wallet: &Pubkey) -> u64 {
    client
        .mock_transfers()
        .iter()
        .filter(|t| t.destination == *wallet)
        .map(|t| t.lamports)
        .sum()
}

// =============================================================================
// 1. Proportional split
// =============================================================================

#[tokio::test]
async fn test_scores_30_70_split_budget_of_10() {
    let h = harness(sol(20.0), 10.0, 10.0, 0.0);
    let (alice, alice_wallet, _) = payee(&h.store, "alice", &[30]);
    let (bob, bob_wallet, _) = payee(&h.store, "bob", &[70]);

    let summary = h.cycle.run().await;

    assert!(summary.is_clean());
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.total_amount, sol(10.0));
    assert_eq!(transferred_to(&h.client, &alice_wallet), sol(3.0));
    assert_eq!(transferred_to(&h.client, &bob_wallet), sol(7.0));
    assert_eq!(h.store.user(alice).unwrap().total_earned, sol(3.0));
    assert_eq!(h.store.user(bob).unwrap().total_earned, sol(7.0));
}

// =============================================================================
// 2. Cap without redistribution
// =============================================================================

#[tokio::test]
async fn test_cap_leaves_remainder_undistributed() {
    let h = harness(sol(20.0), 10.0, 1.0, 0.0);
    let (alice, _, subs) = payee(&h.store, "alice", &[100]);

    let summary = h.cycle.run().await;

    assert_eq!(summary.total_amount, sol(1.0));
    assert_eq!(h.store.user(alice).unwrap().total_earned, sol(1.0));
    assert_eq!(h.client.get_balance().await.unwrap(), sol(19.0));
    assert_eq!(h.store.submission(subs[0]).unwrap().status, SubmissionStatus::Paid);
}

// =============================================================================
// 3. Floor
// =============================================================================

#[tokio::test]
async fn test_share_below_floor_is_excluded() {
    let h = harness(sol(20.0), 10.0, 10.0, 5.0);
    let (small, small_wallet, small_subs) = payee(&h.store, "small", &[1]);
    let (big, _, _) = payee(&h.store, "big", &[9_999]);

    let summary = h.cycle.run().await;

    assert_eq!(summary.total_processed, 1);
    assert_eq!(transferred_to(&h.client, &small_wallet), 0);
    assert_eq!(h.store.user(small).unwrap().total_earned, 0);
    assert_eq!(h.store.user(big).unwrap().total_earned, sol(9.999));
    // Excluded submissions stay in the pool
    assert_eq!(
        h.store.submission(small_subs[0]).unwrap().status,
        SubmissionStatus::Approved
    );
    assert!(h.store.payout_records().iter().all(|r| r.user_id != small));
}

// =============================================================================
// 4. Funding shortfall
// =============================================================================

#[tokio::test]
async fn test_shortfall_makes_no_transfers() {
    let h = harness(sol(0.5), 1.0, 1.0, 0.0);
    let (_, _, subs) = payee(&h.store, "alice", &[10]);

    let summary = h.cycle.run().await;

    assert_eq!(summary.total_processed, 0);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.total_amount, 0);
    let error = summary.error.expect("shortfall error");
    assert!(error.contains("Insufficient treasury balance"));
    assert!(error.contains(&sol(0.5).to_string()));
    assert!(h.client.mock_transfers().is_empty());
    assert!(h.store.payout_records().is_empty());
    assert_eq!(h.store.submission(subs[0]).unwrap().status, SubmissionStatus::Approved);
}

// =============================================================================
// 5. Partial failure
// =============================================================================

#[tokio::test]
async fn test_failed_recipient_is_isolated() {
    let h = harness(sol(20.0), 3.0, 1.0, 0.0);
    let (u1, _, subs1) = payee(&h.store, "one", &[10]);
    let (u2, wallet2, subs2) = payee(&h.store, "two", &[5, 5]);
    let (u3, _, subs3) = payee(&h.store, "three", &[10]);
    h.client.fail_mock_destination(wallet2);

    let summary = h.cycle.run().await;

    assert_eq!(summary.total_processed, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total_amount, sol(2.0));
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].user_id, u2);
    assert_eq!(summary.errors[0].kind, FailureKind::Transfer);

    for (user, subs) in [(u1, &subs1), (u3, &subs3)] {
        assert_eq!(h.store.user(user).unwrap().total_earned, sol(1.0));
        for sub in subs {
            assert_eq!(h.store.submission(*sub).unwrap().status, SubmissionStatus::Paid);
        }
    }

    assert_eq!(h.store.user(u2).unwrap().total_earned, 0);
    for sub in &subs2 {
        assert_eq!(h.store.submission(*sub).unwrap().status, SubmissionStatus::Approved);
    }
    let failed: Vec<_> = h
        .store
        .payout_records()
        .into_iter()
        .filter(|r| r.user_id == u2)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, PayoutStatus::Failed);
    assert_eq!(failed[0].retry_count, 1);
    assert!(failed[0].error.is_some());
    assert!(failed[0].tx_signature.is_none());

    let retryable = h.store.retryable_failed_payouts(3).await.unwrap();
    assert_eq!(retryable.len(), 1);
    assert_eq!(retryable[0].user_id, u2);
}

// =============================================================================
// 6. Re-run after partial failure
// =============================================================================

#[tokio::test]
async fn test_rerun_reselects_only_unpaid_submissions() {
    let h = harness(sol(20.0), 3.0, 1.0, 0.0);
    let (u1, _, _) = payee(&h.store, "one", &[10]);
    let (u2, wallet2, subs2) = payee(&h.store, "two", &[10]);
    let (u3, _, _) = payee(&h.store, "three", &[10]);
    // Paid in some earlier cycle
    let old_paid = h.store.insert_submission(u2, 50, SubmissionStatus::Paid);
    h.client.fail_mock_destination(wallet2);

    let first = h.cycle.run().await;
    assert_eq!((first.successful, first.failed), (2, 1));

    h.client.heal_mock_destination(&wallet2);
    let second = h.cycle.run().await;

    assert_eq!(second.total_processed, 1);
    assert_eq!(second.successful, 1);
    assert_ne!(second.batch_id, first.batch_id);

    let records = h.store.payout_records();
    let retry = records
        .iter()
        .find(|r| r.batch_id == second.batch_id)
        .expect("new record for the failed recipient");
    assert_eq!(retry.user_id, u2);
    assert_eq!(retry.submission_ids, subs2);
    assert!(!retry.submission_ids.contains(&old_paid));
    assert_eq!(retry.status, PayoutStatus::Completed);

    assert_eq!(h.store.submission(subs2[0]).unwrap().status, SubmissionStatus::Paid);
    for user in [u1, u2, u3] {
        assert_eq!(h.store.user(user).unwrap().total_earned, sol(1.0));
    }

    // Nothing left to pay
    let third = h.cycle.run().await;
    assert_eq!(third.total_processed, 0);
}

// =============================================================================
// 7. Concurrent cycles
// =============================================================================

#[tokio::test]
async fn test_concurrent_cycles_pay_each_submission_once() {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(SettlementClient::new(
        SettlementConfig::mock(sol(100.0)),
        Pubkey::new_unique(),
    ));
    client.set_mock_latency(Some(Duration::from_millis(30)));

    let mut subs = Vec::new();
    for i in 0..6 {
        let (_, _, s) = payee(&store, &format!("user{}", i), &[10, 20]);
        subs.extend(s);
    }

    let a = PayoutCycle::new(store.clone(), client.clone(), PayoutSettings::default()).unwrap();
    let b = PayoutCycle::new(store.clone(), client.clone(), PayoutSettings::default()).unwrap();
    let (sa, sb) = tokio::join!(a.run(), b.run());

    assert_eq!(sa.failed + sb.failed, 0);
    let completed: Vec<_> = store
        .payout_records()
        .into_iter()
        .filter(|r| r.status == PayoutStatus::Completed)
        .collect();
    assert_eq!(completed.len(), client.mock_transfers().len());

    let mut covered: Vec<SubmissionId> = completed
        .iter()
        .flat_map(|r| r.submission_ids.iter().copied())
        .collect();
    covered.sort();
    covered.dedup();
    let total_covered: usize = completed.iter().map(|r| r.submission_ids.len()).sum();
    assert_eq!(covered.len(), total_covered, "a submission was paid twice");

    for sub in subs {
        assert_eq!(store.submission(sub).unwrap().status, SubmissionStatus::Paid);
    }
}
