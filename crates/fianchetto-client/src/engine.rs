//! The client engine.
//!
//! [`Engine`] is the public face of the crate: connect, authenticate, issue
//! commands, observe games. Internally one dispatch task owns the
//! [`CommandMachine`] outright — callers pass requests over a channel and
//! await a oneshot, so no lock ever guards an automaton transition. The
//! dispatch task also routes unsolicited rows to the game registry.
//!
//! # Dispatch rules
//!
//! Login is driven by cumulative text (its prompts have no line
//! terminator); every other command consumes complete lines. A line is
//! offered to the registry's router first when no command is active, or
//! when the automaton still sits at phase 0 of any command while games are
//! being observed — in that situation the line is most likely a live
//! update, not a response fragment. That tie-break is heuristic: a
//! response's first line can be misrouted while observation is active, in
//! which case the command falls to its caller's timeout. Lines the router
//! does not consume fall through to the automaton.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use fianchetto_proto::{GameListing, TerminationKind, WireError, decode_style12, decode_termination};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
    board::BoardDriver,
    command::{
        CommandAction, CommandData, CommandKind, CommandMachine, CommandReply, CommandRequest,
    },
    config::EngineConfig,
    error::ClientError,
    registry::GameRegistry,
    session::{FinishedCallback, GameSession, lock},
    transport::{LineBuffer, Transport, TransportSender},
};

/// Requests the dispatch task accepts from callers.
enum Request {
    /// Start a command; the reply channel receives the tagged completion.
    Begin {
        request: CommandRequest,
        reply: oneshot::Sender<CommandReply>,
    },
    /// Abandon the in-flight command (caller-side timeout).
    Reset,
    /// Discard buffered input to resynchronize after commands whose output
    /// is not consumed.
    Flush,
    /// Stop the dispatch loop and the transport.
    Shutdown,
}

/// Client engine for one server connection.
///
/// One engine owns exactly one transport; nothing is shared across
/// connections. All methods are cancel-safe from the caller's side: a
/// timed-out command resets the automaton and the engine stays usable.
pub struct Engine {
    sender: TransportSender,
    requests: mpsc::Sender<Request>,
    registry: Arc<Mutex<GameRegistry>>,
    variables: Mutex<HashMap<String, String>>,
    changed: Mutex<Vec<(String, String)>>,
    game_cache: Mutex<Option<Vec<GameListing>>>,
    config: EngineConfig,
    dispatch_abort: tokio::task::AbortHandle,
}

impl Engine {
    /// Connect with the default configuration.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::connect_with_config(host, port, EngineConfig::default()).await
    }

    /// Connect and start the dispatch task.
    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: EngineConfig,
    ) -> Result<Self, ClientError> {
        let transport = Transport::connect(host, port, config.chunk_capacity).await?;
        let sender = transport.sender();
        let registry = Arc::new(Mutex::new(GameRegistry::new()));

        let (request_tx, request_rx) = mpsc::channel(config.request_capacity);
        let dispatch = tokio::spawn(run_dispatch(transport, request_rx, Arc::clone(&registry)));
        info!(host, port, "connected");

        Ok(Self {
            sender,
            requests: request_tx,
            registry,
            variables: Mutex::new(HashMap::new()),
            changed: Mutex::new(Vec::new()),
            game_cache: Mutex::new(None),
            config,
            dispatch_abort: dispatch.abort_handle(),
        })
    }

    /// Authenticate with the server.
    ///
    /// The username `guest` (any case) requests anonymous access. Server
    /// rejections surface verbatim as [`ClientError::Auth`].
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let request = CommandRequest::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.issue("login", request, timeout).await.map(|_| ())
    }

    /// Suppress noise channels and switch the session to the
    /// machine-parseable move format.
    ///
    /// Captures the server's current values first so [`Engine::disconnect`]
    /// can restore every setting this session changed.
    pub async fn set_quiet_mode(&self) -> Result<(), ClientError> {
        self.variable_list(self.config.command_timeout).await?;
        let originals = lock(&self.variables).clone();

        for (name, value) in &self.config.settings {
            if let Some(original) = originals.get(name) {
                if original != value {
                    lock(&self.changed).push((name.clone(), original.clone()));
                }
            }
            self.sender.send_line(&format!("set {name} {value}")).await?;
        }
        for (name, value) in &self.config.interface_settings {
            self.sender.send_line(&format!("iset {name} {value}")).await?;
        }

        // The set/iset acknowledgements carry nothing we consume.
        self.requests.send(Request::Flush).await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Fetch the observable games.
    ///
    /// With `refresh` false a previously fetched list is returned without
    /// touching the server.
    pub async fn game_list(
        &self,
        refresh: bool,
        timeout: Duration,
    ) -> Result<Vec<GameListing>, ClientError> {
        if !refresh {
            if let Some(cached) = lock(&self.game_cache).clone() {
                return Ok(cached);
            }
        }
        match self.issue("games", CommandRequest::GameList, timeout).await? {
            CommandData::Games(games) => {
                *lock(&self.game_cache) = Some(games.clone());
                Ok(games)
            },
            other => Err(unexpected("games", &other)),
        }
    }

    /// Fetch the server's variable settings; returns how many were read.
    ///
    /// The map is retained and queryable through [`Engine::variable`].
    pub async fn variable_list(&self, timeout: Duration) -> Result<usize, ClientError> {
        match self.issue("variables", CommandRequest::VariableList, timeout).await? {
            CommandData::Variables(variables) => {
                let count = variables.len();
                *lock(&self.variables) = variables;
                Ok(count)
            },
            other => Err(unexpected("variables", &other)),
        }
    }

    /// A variable from the last fetched listing. Names are
    /// case-insensitive.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<String> {
        lock(&self.variables).get(&name.to_ascii_lowercase()).cloned()
    }

    /// Fetch the server's local/server/GMT time lines.
    pub async fn server_date(&self, timeout: Duration) -> Result<Vec<String>, ClientError> {
        match self.issue("date", CommandRequest::Date, timeout).await? {
            CommandData::Date(lines) => Ok(lines),
            other => Err(unexpected("date", &other)),
        }
    }

    /// Start observing a game.
    ///
    /// Registers a session, requests observation and the movelist backfill,
    /// and initializes the board once the backfill separator is seen. Live
    /// updates then flow to the board until termination. With a
    /// `move_timeout`, a game that stalls longer than that between
    /// snapshots is terminated with an error.
    pub async fn observe(
        &self,
        listing: &GameListing,
        board: Arc<dyn BoardDriver>,
        timeout: Duration,
        move_timeout: Option<Duration>,
        on_finished: Option<FinishedCallback>,
    ) -> Result<(), ClientError> {
        if listing.private {
            return Err(ClientError::PrivateGame { game_id: listing.id });
        }
        if !listing.category.is_observable() {
            return Err(ClientError::NotObservable { category: listing.category });
        }

        let game_id = listing.id;
        let session =
            Arc::new(GameSession::new(listing.clone(), board, move_timeout, on_finished));
        lock(&self.registry).register(Arc::clone(&session))?;

        // The watchdog terminates through the registry so routing stops the
        // moment the timeout fires.
        let registry = Arc::clone(&self.registry);
        session.arm(move || {
            lock(&registry).terminate(
                game_id,
                TerminationKind::Error("no move arrived within the move timeout".to_string()),
                "",
            );
        });

        self.sender.send_line(&format!("observe {game_id}")).await?;
        match self.issue("moves", CommandRequest::MoveList { game_id }, timeout).await {
            // The dispatch task marked the session ready when it saw the
            // movelist separator, before routing any backfill row.
            Ok(_) => Ok(()),
            Err(error) => {
                lock(&self.registry).terminate(
                    game_id,
                    TerminationKind::Error("observation setup failed".to_string()),
                    "",
                );
                Err(error)
            },
        }
    }

    /// Stop observing the game attached to this board handle.
    ///
    /// Returns `false` if no observed game uses the handle.
    pub fn unobserve(&self, board: &Arc<dyn BoardDriver>) -> bool {
        let session = lock(&self.registry).find_by_board(board);
        match session {
            Some(session) => lock(&self.registry).terminate(
                session.game_id(),
                TerminationKind::Terminated,
                "observation stopped",
            ),
            None => false,
        }
    }

    /// Number of games currently observed.
    #[must_use]
    pub fn observed_games(&self) -> usize {
        lock(&self.registry).count()
    }

    /// Restore every setting this session changed, say goodbye, and close
    /// the connection.
    pub async fn disconnect(self) {
        let changed: Vec<(String, String)> = std::mem::take(&mut *lock(&self.changed));
        for (name, value) in changed {
            let _ = self.sender.send_line(&format!("set {name} {value}")).await;
        }
        let _ = self.sender.send_line("quit").await;
        let _ = self.requests.send(Request::Shutdown).await;
    }

    /// Send a request to the dispatch task and await the tagged completion
    /// under the caller's deadline. On timeout the automaton is reset so
    /// the next command can start.
    async fn issue(
        &self,
        name: &'static str,
        request: CommandRequest,
        timeout: Duration,
    ) -> Result<CommandData, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Begin { request, reply: reply_tx })
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                let _ = self.requests.send(Request::Reset).await;
                Err(ClientError::Timeout { command: name, after: timeout })
            },
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Ending the dispatch task drops the transport; its read/write
        // loops then end through channel closure.
        self.dispatch_abort.abort();
    }
}

/// A completion whose data does not match the issued command.
fn unexpected(command: &str, data: &CommandData) -> ClientError {
    ClientError::Protocol(format!("unexpected completion for {command}: {data:?}"))
}

/// The dispatch loop: owns the automaton, the line buffer and the pending
/// completion channel.
async fn run_dispatch(
    mut transport: Transport,
    mut requests: mpsc::Receiver<Request>,
    registry: Arc<Mutex<GameRegistry>>,
) {
    let mut machine = CommandMachine::new();
    let mut buffer = LineBuffer::new();
    let mut pending: Option<oneshot::Sender<CommandReply>> = None;
    let sender = transport.sender();

    loop {
        tokio::select! {
            chunk = transport.from_server.recv() => match chunk {
                Some(chunk) => {
                    handle_chunk(
                        &chunk,
                        &mut machine,
                        &mut buffer,
                        &mut pending,
                        &registry,
                        &sender,
                    )
                    .await;
                },
                None => break,
            },
            request = requests.recv() => match request {
                Some(Request::Begin { request, reply }) => match machine.begin(request) {
                    Ok(actions) => {
                        pending = Some(reply);
                        execute(actions, &mut pending, &sender, &registry).await;
                        // A login prompt may already be sitting in the
                        // buffer from before the command was issued.
                        if machine.kind() == CommandKind::Login {
                            let text = buffer.take_all();
                            if !text.is_empty() {
                                let actions = machine.on_text(&text);
                                execute(actions, &mut pending, &sender, &registry).await;
                            }
                        }
                    },
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    },
                },
                Some(Request::Reset) => {
                    machine.reset();
                    pending = None;
                },
                Some(Request::Flush) => buffer.flush(),
                Some(Request::Shutdown) | None => break,
            },
        }
    }

    // Dropping the transport closes the chunk receiver; the read and write
    // tasks then end through channel closure, after the write task has
    // drained any queued goodbye lines.
    debug!("dispatch loop ended");
}

/// Feed one decoded chunk to the right consumer.
async fn handle_chunk(
    chunk: &str,
    machine: &mut CommandMachine,
    buffer: &mut LineBuffer,
    pending: &mut Option<oneshot::Sender<CommandReply>>,
    registry: &Arc<Mutex<GameRegistry>>,
    sender: &TransportSender,
) {
    buffer.push(chunk);

    if machine.kind() == CommandKind::Login {
        // Login matches prompts with no line terminator: drain everything
        // buffered, partial lines included.
        let text = buffer.take_all();
        let actions = machine.on_text(&text);
        execute(actions, pending, sender, registry).await;
        return;
    }

    while let Some(line) = buffer.next_line() {
        dispatch_line(&line, machine, pending, registry, sender).await;
    }
}

/// Route one complete line to the registry or the automaton.
async fn dispatch_line(
    line: &str,
    machine: &mut CommandMachine,
    pending: &mut Option<oneshot::Sender<CommandReply>>,
    registry: &Arc<Mutex<GameRegistry>>,
    sender: &TransportSender,
) {
    let bypass = matches!(machine.kind(), CommandKind::None | CommandKind::PreLogin)
        || (machine.phase() == 0 && lock(registry).is_observing());
    if bypass && route_unsolicited(line, registry) {
        return;
    }

    if machine.kind() == CommandKind::None {
        if !line.trim().is_empty() {
            trace!(line, "line with no active command dropped");
        }
        return;
    }

    let actions = machine.on_line(line);
    execute(actions, pending, sender, registry).await;
}

/// Try to consume a line as an unsolicited game update.
///
/// Returns `true` when the line was a position row or a termination
/// announcement (whether or not the game was registered).
fn route_unsolicited(line: &str, registry: &Arc<Mutex<GameRegistry>>) -> bool {
    match decode_style12(line) {
        Ok(Some(update)) => {
            let session = lock(registry).get(update.game_id);
            match session {
                Some(session) => session.apply(update),
                None => debug!(game_id = update.game_id, "position for a game not observed"),
            }
            true
        },
        // A malformed position would corrupt that game's state if ignored:
        // hard-terminate the affected game, leave the connection alone.
        Err(error) => {
            if let WireError::MalformedPosition { game_id: Some(game_id), reason } = &error {
                warn!(game_id = *game_id, reason = %reason, "malformed position line");
                lock(registry).terminate(
                    *game_id,
                    TerminationKind::Error(reason.clone()),
                    "",
                );
            } else {
                warn!(error = %error, "malformed position line without a game id");
            }
            true
        },
        Ok(None) => match decode_termination(line) {
            Some(termination) => {
                let routed = lock(registry).terminate(
                    termination.game_id,
                    termination.kind,
                    &termination.comment,
                );
                if !routed {
                    debug!(game_id = termination.game_id, "termination for a game not observed");
                }
                true
            },
            None => false,
        },
    }
}

/// Execute automaton actions: send lines, deliver completions.
///
/// A movelist completion marks its session ready here, on the dispatch
/// task, so the board is initialized before any backfill row that follows
/// on the same channel is dispatched.
async fn execute(
    actions: Vec<CommandAction>,
    pending: &mut Option<oneshot::Sender<CommandReply>>,
    sender: &TransportSender,
    registry: &Arc<Mutex<GameRegistry>>,
) {
    for action in actions {
        match action {
            CommandAction::Send(line) => {
                if sender.send_line(&line).await.is_err() {
                    warn!("transport gone; outgoing line dropped");
                }
            },
            CommandAction::Complete(reply) => {
                if let Ok(CommandData::MoveListReady(game_id)) = &reply {
                    if let Some(session) = lock(registry).get(*game_id) {
                        session.mark_ready();
                    }
                }
                match pending.take() {
                    Some(waiter) => {
                        let _ = waiter.send(reply);
                    },
                    None => debug!("completion with no waiting caller"),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use fianchetto_proto::Color;

    use super::*;
    use crate::session::testing::{BoardCall, RecordingBoard, listing, update};

    fn observed(
        registry: &Arc<Mutex<GameRegistry>>,
        id: u32,
    ) -> (Arc<GameSession>, Arc<RecordingBoard>) {
        let board = Arc::new(RecordingBoard::default());
        let driver: Arc<dyn BoardDriver> = Arc::clone(&board) as Arc<dyn BoardDriver>;
        let session = Arc::new(GameSession::new(listing(id), driver, None, None));
        lock(registry).register(Arc::clone(&session)).expect("register should succeed");
        session.mark_ready();
        session.apply(update(id, 1, "none", Color::White));
        (session, board)
    }

    #[test]
    fn position_rows_route_to_the_observed_session() {
        let registry = Arc::new(Mutex::new(GameRegistry::new()));
        let (_session, board) = observed(&registry, 7);

        let row = "<12> rnbqkbnr pppppppp -------- -------- -------- -------- PPPPPPPP RNBQKBNR \
                   B -1 1 1 1 1 0 7 Newton Einstein 0 2 12 39 39 119 122 2 P/e2-e4 (0:06) e4 0";
        assert!(route_unsolicited(row, &registry));
        assert!(board.calls().contains(&BoardCall::Move("e4".to_string())));
    }

    #[test]
    fn malformed_position_terminates_that_game_only() {
        let registry = Arc::new(Mutex::new(GameRegistry::new()));
        let (session, board) = observed(&registry, 7);
        let (other, _other_board) = observed(&registry, 8);

        let row = "<12> rnbqkbnr pppppppp -------- -------- -------- -------- PPPPPPPP RNBQKBNR \
                   B -1 1 1 1 1 0 7 Newton Einstein 0 2 12 39 39 119 -5 2 P/e2-e4 (0:06) e4 0";
        assert!(route_unsolicited(row, &registry));

        assert!(session.is_terminated());
        assert!(!other.is_terminated());
        assert_eq!(lock(&registry).count(), 1);
        assert!(board.calls().iter().any(|c| matches!(c, BoardCall::Error(_))));
    }

    #[test]
    fn termination_rows_unregister_and_forward() {
        let registry = Arc::new(Mutex::new(GameRegistry::new()));
        let (session, _board) = observed(&registry, 378);

        let line = "{Game 378 (OlegM vs. Chessnull) Chessnull forfeits on time} 1-0";
        assert!(route_unsolicited(line, &registry));

        assert!(session.is_terminated());
        assert_eq!(
            session.outcome(),
            Some((TerminationKind::WhiteWins, "Chessnull forfeits on time".to_string()))
        );
        assert_eq!(lock(&registry).count(), 0);
    }

    #[test]
    fn unrelated_lines_are_not_consumed() {
        let registry = Arc::new(Mutex::new(GameRegistry::new()));
        assert!(!route_unsolicited("fics% games", &registry));
        let row = " 93 1723 a 1734 b [ sr 20 10] 5:11 - 6:48 (18-18) W: 19";
        assert!(!route_unsolicited(row, &registry));
    }
}
