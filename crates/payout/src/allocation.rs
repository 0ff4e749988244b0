//! Proportional allocation of the cycle budget

use attention_core::{BatchId, NewPayoutRecord, PayoutPeriod, SubmissionId, UserId};
use attention_settings::PayoutLimits;

use crate::AggregatedUser;

/// Lamports owed to one user this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub user_id: UserId,
    pub wallet_address: String,
    pub username: String,
    /// Lamports, always > 0
    pub amount: u64,
    pub submission_ids: Vec<SubmissionId>,
    pub period: PayoutPeriod,
}

impl Allocation {
    /// Payout record to persist before the transfer
    pub fn new_record(&self, batch_id: BatchId) -> NewPayoutRecord {
        NewPayoutRecord {
            user_id: self.user_id,
            amount: self.amount,
            batch_id,
            period: self.period,
            submission_ids: self.submission_ids.clone(),
        }
    }
}

/// Split `limits.budget` across users in proportion to their scores.
///
/// Each share is `floor(budget * score / total_score)`, then capped at
/// `max_per_user`. Shares below `min_payout` (and zero shares) are dropped.
/// Nothing is redistributed, so the sum never exceeds the budget. Output
/// keeps input order.
pub fn calculate_allocations(users: &[AggregatedUser], limits: &PayoutLimits) -> Vec<Allocation> {
    let total_score: u128 = users.iter().map(|u| u.total_score as u128).sum();
    if total_score == 0 {
        return Vec::new();
    }

    users
        .iter()
        .filter_map(|user| {
            // raw <= budget, so the narrowing below cannot truncate
            let raw = (limits.budget as u128 * user.total_score as u128) / total_score;
            let amount = (raw as u64).min(limits.max_per_user);
            if amount == 0 || amount < limits.min_payout {
                return None;
            }
            Some(Allocation {
                user_id: user.user_id,
                wallet_address: user.wallet_address.clone(),
                username: user.username.clone(),
                amount,
                submission_ids: user.submission_ids.clone(),
                period: user.period,
            })
        })
        .collect()
}

/// Sum of allocated lamports
pub fn total_allocated(allocations: &[Allocation]) -> u64 {
    allocations.iter().fold(0u64, |acc, a| acc.saturating_add(a.amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attention_core::LAMPORTS_PER_SOL;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(score: u64) -> AggregatedUser {
        AggregatedUser {
            user_id: Uuid::new_v4(),
            wallet_address: "wallet".to_string(),
            username: "user".to_string(),
            total_score: score,
            submission_ids: vec![Uuid::new_v4()],
            period: PayoutPeriod::at(Utc::now()),
        }
    }

    fn limits(budget_sol: u64, cap_sol: u64, min_lamports: u64) -> PayoutLimits {
        PayoutLimits {
            budget: budget_sol * LAMPORTS_PER_SOL,
            max_per_user: cap_sol * LAMPORTS_PER_SOL,
            min_payout: min_lamports,
        }
    }

    #[test]
    fn test_proportional_split() {
        let users = vec![user(100), user(300)];
        let allocations = calculate_allocations(&users, &limits(10, 10, 0));

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].amount, 2_500_000_000);
        assert_eq!(allocations[1].amount, 7_500_000_000);
    }

    #[test]
    fn test_cap_without_redistribution() {
        let users = vec![user(900), user(100)];
        let allocations = calculate_allocations(&users, &limits(10, 1, 0));

        assert_eq!(allocations[0].amount, LAMPORTS_PER_SOL);
        assert_eq!(allocations[1].amount, LAMPORTS_PER_SOL);
        assert_eq!(total_allocated(&allocations), 2 * LAMPORTS_PER_SOL);
    }

    #[test]
    fn test_floor_drops_small_shares() {
        let users = vec![user(1), user(999_999)];
        let allocations = calculate_allocations(&users, &limits(1, 1, 5_000_000));

        // 1 / 1_000_000 of a SOL is below the floor
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].user_id, users[1].user_id);
        assert_eq!(allocations[0].amount, 999_999_000);
    }

    #[test]
    fn test_zero_share_dropped_even_without_floor() {
        let users = vec![user(1), user(u64::MAX / 2)];
        let allocations = calculate_allocations(
            &users,
            &PayoutLimits { budget: 10, max_per_user: 10, min_payout: 0 },
        );
        assert_eq!(allocations.len(), 1);
        assert!(allocations.iter().all(|a| a.amount > 0));
    }

    #[test]
    fn test_zero_total_score() {
        assert!(calculate_allocations(&[user(0), user(0)], &limits(10, 10, 0)).is_empty());
        assert!(calculate_allocations(&[], &limits(10, 10, 0)).is_empty());
    }

    #[test]
    fn test_rounding_never_exceeds_budget() {
        let users = vec![user(1), user(1), user(1)];
        let allocations = calculate_allocations(
            &users,
            &PayoutLimits { budget: 100, max_per_user: 100, min_payout: 0 },
        );
        assert!(allocations.iter().all(|a| a.amount == 33));
        assert!(total_allocated(&allocations) <= 100);
    }

    #[test]
    fn test_deterministic() {
        let users = vec![user(7), user(11), user(13)];
        let l = limits(3, 1, 1);
        assert_eq!(calculate_allocations(&users, &l), calculate_allocations(&users, &l));
    }
}
