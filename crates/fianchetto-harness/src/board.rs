//! Recording board double for end-to-end tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fianchetto_client::BoardDriver;
use fianchetto_proto::{BoardGrid, Color};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded board call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardCall {
    /// `apply_move` with the SAN move.
    Move(String),
    /// `initialize_from_moves` with the replayed moves.
    InitFromMoves(Vec<String>),
    /// `set_position` (grid contents elided).
    SetPosition,
    /// `reset_clocks`.
    ResetClocks,
    /// `set_time_budget`.
    SetTimeBudget,
    /// `show_message` with the text.
    Message(String),
    /// `show_error` with the text.
    Error(String),
    /// `refresh`.
    Refresh,
}

/// Board double that runs UI closures inline and records every call.
#[derive(Debug, Default)]
pub struct RecordingBoard {
    calls: Mutex<Vec<BoardCall>>,
}

impl RecordingBoard {
    /// A fresh board behind an `Arc`, ready to hand to the engine.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything the engine asked this board to do so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BoardCall> {
        lock(&self.calls).clone()
    }

    /// The SAN moves applied so far (initialization moves excluded).
    #[must_use]
    pub fn moves(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                BoardCall::Move(san) => Some(san.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BoardCall) {
        lock(&self.calls).push(call);
    }
}

impl BoardDriver for RecordingBoard {
    fn apply_move(&self, san: &str) {
        self.record(BoardCall::Move(san.to_string()));
    }

    fn initialize_from_moves(
        &self,
        moves: &[String],
        _to_move: Color,
        _white_name: &str,
        _black_name: &str,
        _white_elapsed: Duration,
        _black_elapsed: Duration,
    ) {
        self.record(BoardCall::InitFromMoves(moves.to_vec()));
    }

    fn set_position(&self, _grid: &BoardGrid, _to_move: Color) {
        self.record(BoardCall::SetPosition);
    }

    fn reset_clocks(
        &self,
        _to_move: Color,
        _white_remaining: Duration,
        _black_remaining: Duration,
    ) {
        self.record(BoardCall::ResetClocks);
    }

    fn set_time_budget(&self, _base: Duration, _increment: Duration) {
        self.record(BoardCall::SetTimeBudget);
    }

    fn show_message(&self, text: &str) {
        self.record(BoardCall::Message(text.to_string()));
    }

    fn show_error(&self, text: &str) {
        self.record(BoardCall::Error(text.to_string()));
    }

    fn refresh(&self) {
        self.record(BoardCall::Refresh);
    }

    fn run_on_ui(&self, f: fianchetto_client::UiClosure) {
        f();
    }
}
