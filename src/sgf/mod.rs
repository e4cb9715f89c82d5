//! SGF (Smart Game Format) property model and parser.
//!
//! Split into a dumb syntax layer (`parser`, grounded in
//! `original_source/backend/parser.go`'s `SGFNode`) that knows
//! nothing about move legality or game semantics, and a property model
//! (`node`) shared by both the parser and the tree layer's serializer.
//! `crate::tree::State::from_sgf`/`to_sgf` own the semantic mapping between
//! `ParsedObject` and `TreeNode`, mirroring `state.go`'s `FromSGF`.

mod node;
mod parser;

pub use node::{Charset, GameType, Komi, Label, PenStroke, SGFProperty, escape, unescape};
pub(crate) use parser::{ParsedNode, ParsedObject, parse};
