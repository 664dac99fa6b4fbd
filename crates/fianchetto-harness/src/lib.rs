//! Test harness for the fianchetto client engine.
//!
//! Provides a scripted loopback server ([`ScriptServer`]) that plays a
//! canned transcript against one client connection, and a recording board
//! double ([`RecordingBoard`]) for asserting on the engine's board calls.
//! The end-to-end tests in `tests/` drive the real engine — sockets,
//! telnet layer and all — against these.

#![forbid(unsafe_code)]

mod board;
mod script_server;

pub use board::{BoardCall, RecordingBoard};
pub use script_server::{ScriptServer, ScriptStep};
