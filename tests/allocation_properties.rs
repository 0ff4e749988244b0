//! Allocation invariants over randomised inputs
//!
//! Conservation, cap, floor, proportionality and determinism, checked over
//! a few hundred seeded random populations.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use attention_core::{EligibleSubmission, PayoutPeriod};
use attention_payout::{aggregate, calculate_allocations, total_allocated, AggregatedUser};
use attention_settings::PayoutLimits;

fn random_users(rng: &mut StdRng) -> Vec<AggregatedUser> {
    let count = rng.gen_range(0..40);
    (0..count)
        .map(|i| AggregatedUser {
            user_id: Uuid::new_v4(),
            wallet_address: format!("wallet-{}", i),
            username: format!("user-{}", i),
            total_score: if rng.gen_bool(0.1) { 0 } else { rng.gen_range(1..1_000_000) },
            submission_ids: vec![Uuid::new_v4()],
            period: PayoutPeriod::at(Utc::now()),
        })
        .collect()
}

fn random_limits(rng: &mut StdRng) -> PayoutLimits {
    let budget = rng.gen_range(0..100_000_000_000u64);
    PayoutLimits {
        budget,
        max_per_user: rng.gen_range(0..=budget.max(1)),
        min_payout: rng.gen_range(0..10_000_000),
    }
}

#[test]
fn test_allocation_invariants_hold() {
    let mut rng = StdRng::seed_from_u64(0xA77E_u64);

    for _ in 0..500 {
        let users = random_users(&mut rng);
        let limits = random_limits(&mut rng);
        let allocations = calculate_allocations(&users, &limits);
        let total_score: u128 = users.iter().map(|u| u.total_score as u128).sum();

        // Conservation
        assert!(total_allocated(&allocations) <= limits.budget);

        for a in &allocations {
            // Cap and floor
            assert!(a.amount <= limits.max_per_user);
            assert!(a.amount >= limits.min_payout);
            assert!(a.amount > 0);

            // Proportionality: exact floor share unless capped
            let user = users.iter().find(|u| u.user_id == a.user_id).unwrap();
            let raw = (limits.budget as u128 * user.total_score as u128 / total_score) as u64;
            assert_eq!(a.amount, raw.min(limits.max_per_user));
        }

        // Higher score never receives less
        for x in &allocations {
            for y in &allocations {
                let sx = users.iter().find(|u| u.user_id == x.user_id).unwrap().total_score;
                let sy = users.iter().find(|u| u.user_id == y.user_id).unwrap().total_score;
                if sx >= sy {
                    assert!(x.amount >= y.amount);
                }
            }
        }

        // Order follows input, determinism
        let positions: Vec<usize> = allocations
            .iter()
            .map(|a| users.iter().position(|u| u.user_id == a.user_id).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(allocations, calculate_allocations(&users, &limits));
    }
}

#[test]
fn test_aggregate_then_allocate_conserves_scores() {
    let mut rng = StdRng::seed_from_u64(7);
    let owners: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

    let rows: Vec<EligibleSubmission> = (0..50)
        .map(|_| {
            let user_id = owners[rng.gen_range(0..owners.len())];
            EligibleSubmission {
                submission_id: Uuid::new_v4(),
                user_id,
                wallet_address: format!("wallet-{}", user_id),
                username: "user".to_string(),
                score: rng.gen_range(1..500),
                submitted_at: Utc::now(),
            }
        })
        .collect();

    let users = aggregate(&rows).unwrap();
    let summed: u64 = users.iter().map(|u| u.total_score).sum();
    assert_eq!(summed, rows.iter().map(|r| r.score).sum::<u64>());
    let covered: usize = users.iter().map(|u| u.submission_ids.len()).sum();
    assert_eq!(covered, rows.len());

    let limits = PayoutLimits {
        budget: 1_000_000_000,
        max_per_user: 1_000_000_000,
        min_payout: 0,
    };
    let allocations = calculate_allocations(&users, &limits);
    assert_eq!(allocations.len(), users.len());
    // Flooring loses at most one lamport per user
    let total = total_allocated(&allocations);
    assert!(total <= limits.budget);
    assert!(limits.budget - total < users.len() as u64);
}
