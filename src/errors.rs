use thiserror::Error;

/// Why a connection attempt did not reach the `Connected` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("invalid MCP endpoint: {0}")]
    Url(String),
    #[error("failed to open MCP connection: {0}")]
    Transport(String),
    #[error("connection attempt interrupted")]
    Interrupted,
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::Url(err) => ConnectError::Url(err.to_string()),
            err => ConnectError::Transport(err.to_string()),
        }
    }
}
