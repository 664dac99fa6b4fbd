//! Per-game observation session.
//!
//! A session owns everything the engine tracks for one observed game:
//! the descriptor, the externally-owned board handle, buffered position
//! snapshots, per-side elapsed-time totals, the move-arrival watchdog and
//! the terminal outcome.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────┐  mark_ready / first    ┌────────┐   terminate    ┌────────────┐
//! │ Pending │───────────────────────>│ Active │───────────────>│ Terminated │
//! └─────────┘  snapshot when ready   └────────┘                └────────────┘
//!      │                                                             ↑
//!      └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots arriving while Pending are queued; `mark_ready` (called once
//! the movelist backfill is complete) folds the queue into one board
//! initialization. Terminated is absorbing: later snapshots are ignored.
//! All board mutations are submitted through the driver's UI executor; the
//! session lock serializes snapshot application against a concurrent
//! timeout-triggered termination.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fianchetto_proto::{Color, GameListing, PositionUpdate, TerminationKind};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::board::BoardDriver;

/// Callback invoked once when an observed game finishes.
///
/// Receives the outcome and the composed human-readable message. When no
/// callback is supplied, the message goes to the board's message or error
/// surface instead.
pub type FinishedCallback = Box<dyn Fn(&TerminationKind, &str) + Send + Sync>;

/// Verbose-move value meaning "no move represented" (initial positions).
const NO_MOVE: &str = "none";

/// Lock, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session lifecycle stage.
#[derive(Debug)]
enum Stage {
    /// Awaiting the movelist backfill; snapshots are queued.
    Pending {
        /// Set once the backfill is complete with nothing queued: the next
        /// snapshot initializes the board directly.
        ready: bool,
        /// Snapshots received before the board could be initialized.
        queued: Vec<PositionUpdate>,
    },
    /// Board initialized; snapshots apply live.
    Active,
    /// Outcome set; absorbing.
    Terminated,
}

/// Mutable session state behind the per-session lock.
#[derive(Debug)]
struct SessionState {
    stage: Stage,
    white_elapsed: Duration,
    black_elapsed: Duration,
    outcome: Option<(TerminationKind, String)>,
}

/// State for one observed game.
pub struct GameSession {
    listing: GameListing,
    board: Arc<dyn BoardDriver>,
    move_timeout: Option<Duration>,
    on_finished: Option<FinishedCallback>,
    state: Mutex<SessionState>,
    rearm: Notify,
    watchdog: Mutex<Option<tokio::task::AbortHandle>>,
}

impl GameSession {
    /// Create a session for one game.
    ///
    /// `move_timeout` of `None` disables the watchdog entirely.
    pub fn new(
        listing: GameListing,
        board: Arc<dyn BoardDriver>,
        move_timeout: Option<Duration>,
        on_finished: Option<FinishedCallback>,
    ) -> Self {
        Self {
            listing,
            board,
            move_timeout,
            on_finished,
            state: Mutex::new(SessionState {
                stage: Stage::Pending { ready: false, queued: Vec::new() },
                white_elapsed: Duration::ZERO,
                black_elapsed: Duration::ZERO,
                outcome: None,
            }),
            rearm: Notify::new(),
            watchdog: Mutex::new(None),
        }
    }

    /// The observed game's id.
    #[must_use]
    pub fn game_id(&self) -> u32 {
        self.listing.id
    }

    /// The descriptor this session was created from.
    #[must_use]
    pub fn listing(&self) -> &GameListing {
        &self.listing
    }

    /// The externally-owned board handle.
    #[must_use]
    pub fn board(&self) -> &Arc<dyn BoardDriver> {
        &self.board
    }

    /// Whether the session has reached its terminal stage.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(lock(&self.state).stage, Stage::Terminated)
    }

    /// The terminal outcome and comment, once set.
    #[must_use]
    pub fn outcome(&self) -> Option<(TerminationKind, String)> {
        lock(&self.state).outcome.clone()
    }

    /// Running per-side elapsed totals.
    #[must_use]
    pub fn elapsed(&self) -> (Duration, Duration) {
        let state = lock(&self.state);
        (state.white_elapsed, state.black_elapsed)
    }

    /// Arm the move-arrival watchdog.
    ///
    /// `on_timeout` runs exactly once if no snapshot arrives within the
    /// configured timeout, and never after termination. A session without
    /// a configured timeout never arms.
    pub fn arm(self: &Arc<Self>, on_timeout: impl FnOnce() + Send + 'static) {
        let Some(timeout) = self.move_timeout else {
            return;
        };

        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut action = Some(on_timeout);
            loop {
                tokio::select! {
                    () = session.rearm.notified() => {},
                    () = tokio::time::sleep(timeout) => {
                        if session.is_terminated() {
                            return;
                        }
                        warn!(game_id = session.game_id(), "move timeout elapsed");
                        if let Some(action) = action.take() {
                            action();
                        }
                        return;
                    },
                }
            }
        });
        *lock(&self.watchdog) = Some(task.abort_handle());
    }

    /// The movelist backfill is complete: fold queued snapshots into the
    /// board, or mark the session ready to initialize from the next one.
    pub fn mark_ready(&self) {
        let mut state = lock(&self.state);
        let snapshots = match &mut state.stage {
            Stage::Pending { ready, queued } => {
                if queued.is_empty() {
                    *ready = true;
                    return;
                }
                std::mem::take(queued)
            },
            Stage::Active | Stage::Terminated => return,
        };
        state.stage = Stage::Active;
        self.initialize(snapshots, state.white_elapsed, state.black_elapsed);
    }

    /// Accept one position snapshot.
    pub fn apply(&self, update: PositionUpdate) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if matches!(state.stage, Stage::Terminated) {
            trace!(game_id = self.game_id(), "snapshot after termination ignored");
            return;
        }

        // The side to move did not make the move this snapshot represents.
        if update.verbose_move != NO_MOVE {
            match update.to_move {
                Color::Black => state.white_elapsed += update.move_time,
                Color::White => state.black_elapsed += update.move_time,
            }
        }
        self.rearm.notify_one();

        let initialize_from = match &mut state.stage {
            Stage::Pending { ready: false, queued } => {
                queued.push(update);
                None
            },
            Stage::Pending { ready: true, .. } => Some(update),
            Stage::Active => {
                self.reconcile(&update);
                None
            },
            Stage::Terminated => None,
        };
        if let Some(update) = initialize_from {
            state.stage = Stage::Active;
            self.initialize(vec![update], state.white_elapsed, state.black_elapsed);
        }
    }

    /// Set the terminal outcome.
    ///
    /// Returns `false` if the session had already terminated. Disarms the
    /// watchdog, composes the outcome message, and delivers it through the
    /// finished callback or the board's message/error surface.
    pub fn terminate(&self, kind: TerminationKind, comment: &str) -> bool {
        {
            let mut state = lock(&self.state);
            if matches!(state.stage, Stage::Terminated) {
                return false;
            }
            state.stage = Stage::Terminated;
            state.outcome = Some((kind.clone(), comment.to_string()));
        }
        if let Some(watchdog) = lock(&self.watchdog).take() {
            watchdog.abort();
        }
        debug!(game_id = self.game_id(), outcome = ?kind, "session terminated");

        let message = compose_message(&kind, comment);
        if let Some(callback) = &self.on_finished {
            callback(&kind, &message);
        } else {
            let board = Arc::clone(&self.board);
            let is_error = matches!(kind, TerminationKind::Error(_));
            self.board.run_on_ui(Box::new(move || {
                if is_error {
                    board.show_error(&message);
                } else {
                    board.show_message(&message);
                }
            }));
        }
        true
    }

    /// Initialize the board from buffered snapshots.
    ///
    /// A backfill that starts at move 1 with no move represented is a game
    /// from the standard position: replay the accumulated moves. Anything
    /// else initializes directly from the latest snapshot's grid.
    fn initialize(
        &self,
        snapshots: Vec<PositionUpdate>,
        white_elapsed: Duration,
        black_elapsed: Duration,
    ) {
        let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
            return;
        };
        let standard_start = first.move_number == 1 && first.verbose_move == NO_MOVE;
        let moves: Vec<String> = snapshots
            .iter()
            .filter(|u| u.san_move != NO_MOVE)
            .map(|u| u.san_move.clone())
            .collect();

        let board = Arc::clone(&self.board);
        let listing = self.listing.clone();
        let last = last.clone();
        self.board.run_on_ui(Box::new(move || {
            board.set_time_budget(listing.base, listing.increment);
            if standard_start {
                board.initialize_from_moves(
                    &moves,
                    last.to_move,
                    &last.white_name,
                    &last.black_name,
                    white_elapsed,
                    black_elapsed,
                );
            } else {
                board.set_position(&last.board, last.to_move);
            }
            board.reset_clocks(last.to_move, last.white_remaining, last.black_remaining);
            board.refresh();
        }));
    }

    /// Apply one live snapshot to an initialized board.
    fn reconcile(&self, update: &PositionUpdate) {
        let board = Arc::clone(&self.board);
        let san = update.san_move.clone();
        let to_move = update.to_move;
        let white_remaining = update.white_remaining;
        let black_remaining = update.black_remaining;
        self.board.run_on_ui(Box::new(move || {
            if san != NO_MOVE {
                board.apply_move(&san);
            }
            board.reset_clocks(to_move, white_remaining, black_remaining);
            board.refresh();
        }));
    }
}

/// Fixed per-outcome text, with the server's comment appended when present.
fn compose_message(kind: &TerminationKind, comment: &str) -> String {
    let base = match kind {
        TerminationKind::WhiteWins => "White wins the game".to_string(),
        TerminationKind::BlackWins => "Black wins the game".to_string(),
        TerminationKind::Draw => "The game is a draw".to_string(),
        TerminationKind::Terminated => "The game is over".to_string(),
        TerminationKind::Error(reason) => format!("Observation aborted: {reason}"),
    };
    if comment.is_empty() { base } else { format!("{base} ({comment})") }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for session, registry and engine tests.

    use std::sync::Mutex;
    use std::time::Duration;

    use fianchetto_proto::{
        BoardGrid, Category, Color, GameListing, PositionUpdate, Relation,
    };

    use crate::board::{BoardDriver, UiClosure};

    /// What the board was asked to do, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BoardCall {
        Move(String),
        InitFromMoves(Vec<String>),
        SetPosition,
        ResetClocks,
        SetTimeBudget,
        Message(String),
        Error(String),
        Refresh,
    }

    /// Board double that runs UI closures inline and records every call.
    #[derive(Debug, Default)]
    pub struct RecordingBoard {
        calls: Mutex<Vec<BoardCall>>,
    }

    impl RecordingBoard {
        pub fn calls(&self) -> Vec<BoardCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: BoardCall) {
            self.calls.lock().unwrap().push(call);
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

        fn run_on_ui(&self, f: UiClosure) {
            f();
        }
    }

    /// A plausible observable game descriptor.
    pub fn listing(id: u32) -> GameListing {
        GameListing {
            id,
            white_rating: 1723,
            white_name: "Newton".to_string(),
            black_rating: 1734,
            black_name: "Einstein".to_string(),
            category: Category::Standard,
            rated: true,
            private: false,
            base: Duration::from_secs(20 * 60),
            increment: Duration::from_secs(10),
            white_elapsed: Duration::ZERO,
            black_elapsed: Duration::ZERO,
            white_material: 39,
            black_material: 39,
            to_move: Color::White,
            move_number: 1,
        }
    }

    /// A position snapshot with the given move fields.
    pub fn update(game_id: u32, move_number: u32, san: &str, to_move: Color) -> PositionUpdate {
        let verbose = if san == "none" { "none".to_string() } else { format!("P/{san}") };
        PositionUpdate {
            board: empty_grid(),
            to_move,
            castling: 0b1111,
            irreversible: 0,
            game_id,
            white_name: "Newton".to_string(),
            black_name: "Einstein".to_string(),
            relation: Relation::Observer,
            base: Duration::from_secs(20 * 60),
            increment: Duration::from_secs(10),
            white_material: 39,
            black_material: 39,
            white_remaining: Duration::from_secs(1190),
            black_remaining: Duration::from_secs(1200),
            move_number,
            flipped: move_number == 1,
            verbose_move: verbose,
            move_time: Duration::from_secs(6),
            san_move: san.to_string(),
            clock_ticking: true,
            lag_ms: 0,
        }
    }

    fn empty_grid() -> BoardGrid {
        [[None; 8]; 8]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fianchetto_proto::Color;

    use super::testing::{BoardCall, RecordingBoard, listing, update};
    use super::*;

    fn session(board: &Arc<RecordingBoard>) -> GameSession {
        let driver: Arc<dyn BoardDriver> = Arc::clone(board) as Arc<dyn BoardDriver>;
        GameSession::new(listing(7), driver, None, None)
    }

    #[test]
    fn pending_snapshots_fold_into_one_initialization() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);

        session.apply(update(7, 1, "none", Color::White));
        session.apply(update(7, 1, "e4", Color::Black));
        session.apply(update(7, 1, "e5", Color::White));
        assert!(board.calls().is_empty());

        session.mark_ready();
        let calls = board.calls();
        assert_eq!(calls[0], BoardCall::SetTimeBudget);
        assert_eq!(
            calls[1],
            BoardCall::InitFromMoves(vec!["e4".to_string(), "e5".to_string()])
        );
        assert_eq!(calls[2], BoardCall::ResetClocks);
        assert_eq!(calls[3], BoardCall::Refresh);
    }

    #[test]
    fn non_standard_start_initializes_from_position() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);

        // Backfill that starts mid-game.
        session.apply(update(7, 23, "Qxf7+", Color::Black));
        session.mark_ready();

        let calls = board.calls();
        assert!(calls.contains(&BoardCall::SetPosition));
        assert!(!calls.iter().any(|c| matches!(c, BoardCall::InitFromMoves(_))));
    }

    #[test]
    fn ready_session_initializes_from_first_live_snapshot() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);

        session.mark_ready();
        assert!(board.calls().is_empty());

        session.apply(update(7, 12, "Nf3", Color::Black));
        assert!(board.calls().contains(&BoardCall::SetPosition));
    }

    #[test]
    fn active_session_applies_moves() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);
        session.apply(update(7, 1, "none", Color::White));
        session.mark_ready();

        session.apply(update(7, 2, "Nf3", Color::Black));
        let calls = board.calls();
        assert!(calls.contains(&BoardCall::Move("Nf3".to_string())));
    }

    #[test]
    fn elapsed_totals_credit_the_mover() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);

        // Black to move next, so white made this move.
        session.apply(update(7, 1, "e4", Color::Black));
        assert_eq!(session.elapsed(), (Duration::from_secs(6), Duration::ZERO));

        session.apply(update(7, 2, "e5", Color::White));
        assert_eq!(session.elapsed(), (Duration::from_secs(6), Duration::from_secs(6)));
    }

    #[test]
    fn terminate_is_absorbing() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);
        session.apply(update(7, 1, "none", Color::White));
        session.mark_ready();

        assert!(session.terminate(TerminationKind::WhiteWins, "Einstein resigns"));
        assert!(!session.terminate(TerminationKind::Draw, ""));
        assert!(session.is_terminated());

        let calls_after_termination = board.calls().len();
        session.apply(update(7, 3, "d4", Color::Black));
        assert_eq!(board.calls().len(), calls_after_termination);

        let (kind, comment) = session.outcome().unwrap();
        assert_eq!(kind, TerminationKind::WhiteWins);
        assert_eq!(comment, "Einstein resigns");
    }

    #[test]
    fn termination_message_routes_to_message_surface() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);
        session.terminate(TerminationKind::WhiteWins, "Einstein resigns");

        let calls = board.calls();
        assert_eq!(
            calls,
            vec![BoardCall::Message("White wins the game (Einstein resigns)".to_string())]
        );
    }

    #[test]
    fn error_termination_routes_to_error_surface() {
        let board = Arc::new(RecordingBoard::default());
        let session = session(&board);
        session.terminate(TerminationKind::Error("bad position line".to_string()), "");

        let calls = board.calls();
        assert!(matches!(
            calls.as_slice(),
            [BoardCall::Error(msg)] if msg.contains("bad position line")
        ));
    }

    #[test]
    fn finished_callback_takes_precedence_over_board_surfaces() {
        let board = Arc::new(RecordingBoard::default());
        let driver: Arc<dyn BoardDriver> = Arc::clone(&board) as Arc<dyn BoardDriver>;
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_callback = Arc::clone(&fired);

        let session = GameSession::new(
            listing(7),
            driver,
            None,
            Some(Box::new(move |kind, message| {
                assert_eq!(*kind, TerminationKind::Draw);
                assert!(message.contains("draw"));
                fired_in_callback.fetch_add(1, Ordering::SeqCst);
            })),
        );
        session.terminate(TerminationKind::Draw, "");

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(board.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_exactly_once() {
        let board = Arc::new(RecordingBoard::default());
        let driver: Arc<dyn BoardDriver> = Arc::clone(&board) as Arc<dyn BoardDriver>;
        let session = Arc::new(GameSession::new(
            listing(7),
            driver,
            Some(Duration::from_secs(30)),
            None,
        ));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.arm(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_rearm_the_watchdog() {
        let board = Arc::new(RecordingBoard::default());
        let driver: Arc<dyn BoardDriver> = Arc::clone(&board) as Arc<dyn BoardDriver>;
        let session = Arc::new(GameSession::new(
            listing(7),
            driver,
            Some(Duration::from_secs(30)),
            None,
        ));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.arm(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for move_number in 0..4 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            session.apply(update(7, move_number, "e4", Color::Black));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_never_fires_after_termination() {
        let board = Arc::new(RecordingBoard::default());
        let driver: Arc<dyn BoardDriver> = Arc::clone(&board) as Arc<dyn BoardDriver>;
        let session = Arc::new(GameSession::new(
            listing(7),
            driver,
            Some(Duration::from_secs(30)),
            None,
        ));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.arm(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.terminate(TerminationKind::Terminated, "");
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
