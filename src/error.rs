//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by `rust-route`.
///
/// `Config` errors are fatal at startup (spec §7); `Packet`/`Entry`
/// errors are logged and dropped by the caller and never propagate out
/// of the manager.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("config error: {0}")]
    Config(String),

    #[error("packet error: {0}")]
    Packet(String),

    #[error("entry error: {0}")]
    Entry(String),

    #[error("network error: {0}")]
    Network(String),
}

pub type RouteResult<T> = Result<T, RouteError>;
