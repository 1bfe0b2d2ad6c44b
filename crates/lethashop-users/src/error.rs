use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsersServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream session token is unknown or expired.
    #[error("users service rejected the session token")]
    Unauthorized,

    #[error("unexpected HTTP status {status} from users service: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Provider names are path segments, so only `[a-z0-9_-]` is accepted.
    #[error("unsupported OAuth provider '{0}'")]
    InvalidProvider(String),

    #[error("invalid users service configuration: {0}")]
    InvalidConfig(String),
}
