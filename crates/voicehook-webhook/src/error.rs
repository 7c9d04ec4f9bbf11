use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook request: {0}")]
    Validation(String),

    /// The webhook could not be reached or did not answer in time.
    #[error("webhook unreachable: {0}")]
    Network(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
