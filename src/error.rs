//! Typed error kinds for the parts of the engine callers need to match on.
//!
//! Grounded in spec.md §7. `rule-violation` (an illegal move) is
//! deliberately *not* a variant here — per §4.1/§7 it is silent, modeled as
//! `Option::None`, never an `Err`. Everything else callers might want to
//! react to (log, drop the event, broadcast an `error` frame) gets a
//! variant. Parsing and I/O code that only needs to propagate with `?`
//! keeps using `anyhow::Result`, the way `sgf::parser` and `sgf::node` do;
//! this enum exists for the handful of call sites (the dispatcher, the
//! room controller) that branch on error kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed SGF: {0}")]
    Parse(String),

    #[error("malformed event: {0}")]
    Input(String),

    #[error("allow-listed fetch failed: {0}")]
    Fetch(String),

    #[error("upstream bridge frame rejected: {0}")]
    Upstream(String),

    #[error("state invariant violated: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}
