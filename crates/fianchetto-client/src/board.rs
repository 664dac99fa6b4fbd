//! Board collaborator trait.
//!
//! The [`BoardDriver`] trait is the engine's only view of the graphical
//! board control and the chess-rules model behind it. The engine never
//! validates chess legality or renders anything; it reconciles what the
//! server sent into these calls. Implementations own their threading:
//! [`BoardDriver::run_on_ui`] is the marshaling capability the engine uses
//! for every mutation, so the core never assumes a particular UI threading
//! model.

use std::time::Duration;

use fianchetto_proto::{BoardGrid, Color};

/// Closure submitted to the UI executor.
pub type UiClosure = Box<dyn FnOnce() + Send>;

/// Abstracts the externally-owned board/UI control.
///
/// Implementations must be shareable across the engine's tasks; all
/// mutating calls arrive wrapped in [`BoardDriver::run_on_ui`] closures.
pub trait BoardDriver: Send + Sync {
    /// Apply one move (short algebraic notation) to the current position.
    fn apply_move(&self, san: &str);

    /// Initialize the board from a standard start plus the moves played so
    /// far.
    fn initialize_from_moves(
        &self,
        moves: &[String],
        to_move: Color,
        white_name: &str,
        black_name: &str,
        white_elapsed: Duration,
        black_elapsed: Duration,
    );

    /// Initialize the board directly from a position, for games that did
    /// not start from the standard array.
    fn set_position(&self, grid: &BoardGrid, to_move: Color);

    /// Reset both clocks to the given remaining times.
    fn reset_clocks(&self, to_move: Color, white_remaining: Duration, black_remaining: Duration);

    /// Set the per-side time budget and increment for clock display.
    fn set_time_budget(&self, base: Duration, increment: Duration);

    /// Show an informational message to the user.
    fn show_message(&self, text: &str);

    /// Show an error to the user.
    fn show_error(&self, text: &str);

    /// Redraw after a batch of mutations.
    fn refresh(&self);

    /// Run a closure on the thread that owns the UI.
    fn run_on_ui(&self, f: UiClosure);
}
