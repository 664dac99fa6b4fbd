//! Error types for the client engine.
//!
//! Strongly-typed errors covering the taxonomy the protocol imposes:
//! transport failures, command deadlines, authentication rejections, and
//! caller usage errors (double commands, unobservable games). Wire-format
//! failures stay in `fianchetto_proto::WireError` and are folded into the
//! per-game termination path rather than surfaced here.

use std::time::Duration;

use fianchetto_proto::Category;
use thiserror::Error;

use crate::command::CommandKind;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// TCP connection could not be established.
    #[error("connection to {host}:{port} failed: {reason}")]
    Connect {
        /// Host we dialed.
        host: String,
        /// Port we dialed.
        port: u16,
        /// Underlying failure.
        reason: String,
    },

    /// The connection (or the dispatch loop) has gone away.
    #[error("connection closed")]
    ConnectionClosed,

    /// A different command is already in flight.
    ///
    /// One command at a time: the caller must wait for completion or
    /// timeout before issuing the next one.
    #[error("another command is already active: {active}")]
    CommandInFlight {
        /// The command currently holding the automaton.
        active: CommandKind,
    },

    /// No terminating response arrived within the caller's deadline.
    #[error("{command} timed out after {after:?}")]
    Timeout {
        /// Which command timed out.
        command: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The server rejected the login; the message is surfaced verbatim.
    #[error("login failed: {0}")]
    Auth(String),

    /// The game is already being observed through this engine.
    #[error("game {game_id} is already observed")]
    AlreadyObserved {
        /// The duplicate game id.
        game_id: u32,
    },

    /// Private games cannot be observed.
    #[error("game {game_id} is private")]
    PrivateGame {
        /// The private game's id.
        game_id: u32,
    },

    /// The game's category is not supported for observation.
    #[error("category {category:?} is not observable")]
    NotObservable {
        /// The unsupported category.
        category: Category,
    },

    /// The engine and automaton disagreed about a response shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Returns true if this error is transient and the same call may
    /// succeed on retry.
    ///
    /// Timeouts are transient (the automaton has been reset and a new
    /// command may be issued); usage errors and authentication rejections
    /// are not — they report a condition retrying cannot fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CommandInFlight { .. })
    }
}
