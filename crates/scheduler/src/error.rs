use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid route pattern: {0}")]
    InvalidRoute(#[from] regex::Error),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("navigation source already has a subscriber")]
    AlreadySubscribed,
}

