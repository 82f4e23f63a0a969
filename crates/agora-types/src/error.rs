use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("No provider found for capability: {0}")]
    NoProviderFound(String),

    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Malformed payment challenge: {0}")]
    MalformedChallenge(String),

    #[error("Payment rejected by provider: {0}")]
    PaymentRejected(String),

    #[error("Provider request failed: {0}")]
    ProviderUnreachable(String),

    #[error("Registry call failed: {0}")]
    RegistryCallFailed(String),

    #[error("Storage call failed: {0}")]
    StorageCallFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Provider returned unusable response: {0}")]
    BadProviderResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AgoraError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;
