//! Wire-format decoders for the fianchetto chess-server protocol.
//!
//! Everything in this crate is sans-IO: pure functions and incremental
//! codecs over text and bytes, with no sockets, no clocks and no shared
//! state. The client crate feeds it what the server sent and acts on the
//! structured results.
//!
//! # Components
//!
//! - [`TelnetCodec`]: byte-level telnet negotiation and line-ending
//!   normalization
//! - [`decode_game_listing`]: one `games` row → [`GameListing`]
//! - [`decode_style12`]: one live position row → [`PositionUpdate`]
//! - [`decode_termination`]: termination announcements → [`Termination`]
//! - [`decode_history_line`]: `moves` backfill rows → [`HistoryLine`]
//!
//! # Failure model
//!
//! Decoders never panic on malformed input. Game-list rows degrade to a
//! skippable [`WireError::UnsupportedListing`]; position rows that match
//! the format but carry a bad field fail hard for that game only; rows
//! that are simply not a given format are `Ok(None)`/`None`, not errors.

#![forbid(unsafe_code)]

mod clock;
mod error;
mod game_list;
mod history;
mod style12;
mod telnet;
mod termination;
mod types;

pub use error::{Result, WireError};
pub use game_list::{GameListing, RATING_GUEST, RATING_UNRATED, decode_game_listing, parse_rating};
pub use history::{HistoryLine, TimedMove, decode_history_line};
pub use style12::{
    CASTLE_BLACK_LONG, CASTLE_BLACK_SHORT, CASTLE_WHITE_LONG, CASTLE_WHITE_SHORT, PositionUpdate,
    STYLE12_PREFIX, decode_style12,
};
pub use telnet::{DO, DONT, Decoded, IAC, SUPPRESS_GO_AHEAD, TelnetCodec, WILL, WONT};
pub use termination::{Termination, TerminationKind, decode_termination};
pub use types::{BoardGrid, Category, Color, Piece, PieceKind, Relation};
