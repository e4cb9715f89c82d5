//! Engine crate for a real-time collaborative Go review server: board
//! rules, the SGF codec, the variation tree and its cursor, the explorer
//! layout projection, the event dispatcher, room/session handling, and the
//! upstream live-game bridge. `bin/kibitzd.rs` wires these into a runnable
//! server; this crate is usable on its own for anything that only needs
//! the engine (tests, tooling, an alternate transport).

pub mod board;
pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod explorer;
pub mod persist;
pub mod room;
mod sgf;
pub mod tree;
pub mod framing;

pub use dispatch::{Event, Frame};
pub use error::EngineError;
pub use sgf::{Label, PenStroke, SGFProperty, escape, unescape};
pub use tree::state::State;
pub use tree::{GameTree, NodeId, TreeNode};
