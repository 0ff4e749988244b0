//! Per-user aggregation of eligible submissions

use std::collections::HashMap;

use attention_core::{EligibleSubmission, PayoutPeriod, SubmissionId, UserId};

use crate::{PayoutError, Result};

/// Everything one user contributes to a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedUser {
    pub user_id: UserId,
    pub wallet_address: String,
    pub username: String,
    /// Sum of submission scores
    pub total_score: u64,
    pub submission_ids: Vec<SubmissionId>,
    /// Earliest and latest submission time
    pub period: PayoutPeriod,
}

/// Group submissions by user.
///
/// Users appear in the order their first submission appears in the input;
/// each user's submission ids keep input order. A score total that does not
/// fit in `u64` is a data error.
pub fn aggregate(submissions: &[EligibleSubmission]) -> Result<Vec<AggregatedUser>> {
    let mut index: HashMap<UserId, usize> = HashMap::new();
    let mut users: Vec<AggregatedUser> = Vec::new();

    for s in submissions {
        match index.get(&s.user_id) {
            Some(&i) => {
                let user = &mut users[i];
                user.total_score = user
                    .total_score
                    .checked_add(s.score)
                    .ok_or(PayoutError::ScoreOverflow { user_id: s.user_id })?;
                user.submission_ids.push(s.submission_id);
                user.period.include(s.submitted_at);
            }
            None => {
                index.insert(s.user_id, users.len());
                users.push(AggregatedUser {
                    user_id: s.user_id,
                    wallet_address: s.wallet_address.clone(),
                    username: s.username.clone(),
                    total_score: s.score,
                    submission_ids: vec![s.submission_id],
                    period: PayoutPeriod::at(s.submitted_at),
                });
            }
        }
    }

    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn row(user_id: UserId, score: u64, offset_mins: i64) -> EligibleSubmission {
        EligibleSubmission {
            submission_id: Uuid::new_v4(),
            user_id,
            wallet_address: format!("wallet-{}", user_id),
            username: "user".to_string(),
            score,
            submitted_at: Utc::now() + Duration::minutes(offset_mins),
        }
    }

    #[test]
    fn test_groups_and_sums() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![row(a, 10, 0), row(b, 20, 1), row(a, 30, 2)];

        let users = aggregate(&rows).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, a);
        assert_eq!(users[0].total_score, 40);
        assert_eq!(users[0].submission_ids, vec![rows[0].submission_id, rows[2].submission_id]);
        assert_eq!(users[1].user_id, b);
        assert_eq!(users[1].total_score, 20);
    }

    #[test]
    fn test_period_spans_submissions() {
        let a = Uuid::new_v4();
        let rows = vec![row(a, 1, 30), row(a, 1, -30), row(a, 1, 0)];

        let users = aggregate(&rows).unwrap();
        assert_eq!(users[0].period.start, rows[1].submitted_at);
        assert_eq!(users[0].period.end, rows[0].submitted_at);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_score_overflow_is_error() {
        let a = Uuid::new_v4();
        let rows = vec![row(a, u64::MAX, 0), row(a, 1, 1)];
        assert!(matches!(
            aggregate(&rows),
            Err(PayoutError::ScoreOverflow { user_id }) if user_id == a
        ));

        // Separate users never sum into one u64
        let rows = vec![row(a, u64::MAX, 0), row(Uuid::new_v4(), u64::MAX, 1)];
        assert_eq!(aggregate(&rows).unwrap().len(), 2);
    }
}
