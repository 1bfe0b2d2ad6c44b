use thiserror::Error;

/// Errors returned by the Daraja client.
#[derive(Debug, Error)]
pub enum MpesaError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Daraja answered with an error body or a non-zero `ResponseCode`.
    #[error("M-Pesa rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Non-2xx status without a recognisable Daraja error body.
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid M-Pesa configuration: {0}")]
    InvalidConfig(String),
}
