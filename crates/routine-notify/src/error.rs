#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid notification endpoint '{endpoint}': {message}")]
    Endpoint { endpoint: String, message: String },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode group report: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
    #[error("failed to write group report: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
}
