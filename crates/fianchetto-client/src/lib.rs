//! Client engine for a text-based chess-server protocol.
//!
//! The engine speaks a telnet-style session: human-readable commands go
//! out, and one text channel carries both command responses and unsolicited
//! live-game updates back. This crate owns the hard part of that protocol —
//! telling the two apart — and exposes a small async API on top.
//!
//! # Architecture
//!
//! - [`Transport`]: socket ownership, telnet negotiation, decoded-text
//!   channel (one read task, one write task per connection)
//! - [`CommandMachine`]: sans-IO automaton enforcing the
//!   one-command-at-a-time contract and the per-command phase grammars;
//!   a single dispatch task owns every transition
//! - [`GameRegistry`]: observed games, consulted to route unsolicited rows
//! - [`GameSession`]: per-game snapshot folding, clocks, move-arrival
//!   watchdog, termination
//! - [`Engine`]: the public API tying the above together
//!
//! The engine validates no chess rules and renders nothing; both concerns
//! live behind the [`BoardDriver`] collaborator trait.

#![forbid(unsafe_code)]

mod board;
mod command;
mod config;
mod engine;
mod error;
mod registry;
mod session;
mod transport;

pub use board::{BoardDriver, UiClosure};
pub use command::{
    CommandAction, CommandData, CommandKind, CommandMachine, CommandReply, CommandRequest,
};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::ClientError;
pub use fianchetto_proto::{GameListing, PositionUpdate, TerminationKind};
pub use registry::GameRegistry;
pub use session::{FinishedCallback, GameSession};
pub use transport::{LineBuffer, Transport, TransportSender};
