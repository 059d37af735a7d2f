use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("http client setup failed: {0}")]
    Setup(#[from] reqwest::Error),
    #[error("mqtt: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("invalid setting: {0}")]
    Invalid(String),
}
