use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to reach event broker: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("event broker rejected the event with status {0}")]
    Rejected(reqwest::StatusCode),
}
