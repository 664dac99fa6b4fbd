//! Error types for wire-format decoding.
//!
//! The three decoder families fail differently by design: game-list rows
//! degrade to "unsupported, skip this line", position rows fail hard for the
//! affected game (a silently dropped position would corrupt board state), and
//! move-history rows fail with the offending line attached. Callers pick the
//! recovery policy; nothing in this crate panics on malformed input.

use thiserror::Error;

/// Errors produced by the wire-format decoders.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Game-list row could not be parsed into a descriptor.
    ///
    /// Never fatal: the caller must treat this as "skip this line" (or, in
    /// the command automaton, as end-of-list).
    #[error("unsupported game listing: {reason}")]
    UnsupportedListing {
        /// What made the row unparseable.
        reason: &'static str,
    },

    /// Position row matched the format but a field failed parsing or range
    /// validation.
    ///
    /// Fatal to the affected game: the session must be terminated with an
    /// error rather than left on a stale position.
    #[error("malformed position line for game {game_id:?}: {reason}")]
    MalformedPosition {
        /// Game id, when it could still be recovered from the row.
        game_id: Option<u32>,
        /// The field and failure description.
        reason: String,
    },

    /// Move-history row did not carry the expected move index.
    #[error("illegal move number (expected {expected}): {line:?}")]
    IllegalMoveNumber {
        /// Index the running counter expected.
        expected: u32,
        /// The offending line.
        line: String,
    },
}

/// Result alias for decoder functions.
pub type Result<T> = std::result::Result<T, WireError>;
