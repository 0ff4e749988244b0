use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown submission status: {0}")]
    UnknownSubmissionStatus(String),

    #[error("Unknown payout status: {0}")]
    UnknownPayoutStatus(String),

    #[error("Unknown payout type: {0}")]
    UnknownPayoutType(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
