//! Error types for the multiplexer core.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("input is not shaped like a frame (no recognised fields)")]
    NotAFrame,

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("destination could not be resolved: {0}")]
    DestinationUnresolved(String),

    #[error("credential source could not be opened: {0}")]
    AuthSourceUnavailable(String),
}
