//! Command automaton.
//!
//! The server multiplexes command responses and unsolicited game updates on
//! one text channel; this state machine owns the "one command at a time"
//! contract and the per-command phase grammars that tell the two apart.
//!
//! Sans-IO, action-based: the dispatch loop feeds it text chunks (login
//! runs on cumulative text, everything else on complete lines) and executes
//! the returned [`CommandAction`]s. Completion is a tagged
//! `Result<CommandData, ClientError>` delivered through a single
//! [`CommandAction::Complete`]; the machine returns itself to
//! [`CommandKind::None`] on completion, so the next `begin` succeeds.
//!
//! # Phase grammars
//!
//! Each command interprets its 0-based phase counter differently:
//!
//! | command  | phase 0                    | phase 1+                      |
//! |----------|----------------------------|-------------------------------|
//! | login    | await `login: ` prompt     | password prompt, then banner  |
//! | games    | first row or empty marker  | rows until one fails to parse |
//! | variables| await settings header      | `name=value` tokens           |
//! | date     | await local-time line      | lines until the GMT line      |
//! | moves    | await movelist header      | await the dash separator      |

use std::{collections::HashMap, fmt, time::Instant};

use fianchetto_proto::{GameListing, decode_game_listing};
use tracing::{debug, trace};

use crate::error::ClientError;

/// Prompt that opens the login exchange.
const LOGIN_PROMPT: &str = "login: ";

/// Prompt requesting the account password.
const PASSWORD_PROMPT: &str = "password: ";

/// Username sentinel for anonymous access.
const GUEST_NAME: &str = "guest";

/// Server complaint about illegal characters in a login name.
const BAD_NAME_CHARACTER: &str = "names should only consist of letters";

/// Server complaint about an unknown account.
const NOT_REGISTERED: &str = "is not a registered name";

/// Banner confirming a successful login.
const SESSION_STARTING: &str = "**** Starting session as";

/// Banner rejecting the password.
const INVALID_PASSWORD: &str = "**** Invalid password!";

/// Terminal line of a game list.
const GAMES_DISPLAYED: &str = " games displayed";

/// Header line opening the variables listing.
const VARIABLES_HEADER: &str = "Variable settings of";

/// Trailing formula line of a variables listing.
const FORMULA_PREFIX: &str = "Formula:";

/// First line of the date response.
const LOCAL_TIME_PREFIX: &str = "Local time";

/// Middle line of the date response.
const SERVER_TIME_PREFIX: &str = "Server time";

/// Final line of the date response.
const GMT_PREFIX: &str = "GMT";

/// Separator line preceding movelist bodies.
const MOVELIST_SEPARATOR: &str = "----";

/// Which server command is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// No command active; unsolicited lines route to the game registry.
    None,
    /// Implicit pre-authentication state; not subject to mutual exclusion.
    PreLogin,
    /// The prompt-driven login exchange.
    Login,
    /// Movelist backfill for an observed game.
    MoveList,
    /// The `games` listing.
    GameList,
    /// The `date` query.
    Date,
    /// The `variables` listing.
    VariableList,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::PreLogin => "pre-login",
            Self::Login => "login",
            Self::MoveList => "moves",
            Self::GameList => "games",
            Self::Date => "date",
            Self::VariableList => "variables",
        };
        f.write_str(name)
    }
}

/// A caller's request to start a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// Authenticate with the given credentials.
    Login {
        /// Account name, or the guest sentinel.
        username: String,
        /// Account password (ignored for guests).
        password: String,
    },
    /// Fetch the game list.
    GameList,
    /// Fetch the variables listing.
    VariableList,
    /// Fetch the server date.
    Date,
    /// Fetch the movelist header for an observed game.
    MoveList {
        /// The observed game's id.
        game_id: u32,
    },
}

impl CommandRequest {
    /// The command kind this request activates.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Login { .. } => CommandKind::Login,
            Self::GameList => CommandKind::GameList,
            Self::VariableList => CommandKind::VariableList,
            Self::Date => CommandKind::Date,
            Self::MoveList { .. } => CommandKind::MoveList,
        }
    }
}

/// Data carried by a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandData {
    /// Login finished.
    LoggedIn,
    /// Observable games from the listing.
    Games(Vec<GameListing>),
    /// Variable name → value, keys lowercased.
    Variables(HashMap<String, String>),
    /// The captured date lines.
    Date(Vec<String>),
    /// The movelist header and separator were seen for this game id;
    /// bodies follow as live-format rows through the registry.
    MoveListReady(u32),
}

/// Tagged command completion.
pub type CommandReply = Result<CommandData, ClientError>;

/// Actions returned by the automaton for the dispatch loop to execute.
#[derive(Debug, PartialEq)]
pub enum CommandAction {
    /// Send this line to the server.
    Send(String),
    /// Deliver this result to the waiting caller.
    Complete(CommandReply),
}

/// Per-login mutable state: credentials plus the cumulative text the
/// prompt matching runs against.
#[derive(Debug)]
struct LoginState {
    username: String,
    password: String,
    text: String,
}

/// The command automaton. Owned by the dispatch task; all transitions run
/// there, which is what serializes `begin` against completion.
#[derive(Debug)]
pub struct CommandMachine {
    kind: CommandKind,
    phase: u32,
    started_at: Instant,
    login: Option<LoginState>,
    games: Vec<GameListing>,
    variables: HashMap<String, String>,
    date_lines: Vec<String>,
    movelist_game_id: u32,
}

impl Default for CommandMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandMachine {
    /// Create the automaton in the pre-authentication state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: CommandKind::PreLogin,
            phase: 0,
            started_at: Instant::now(),
            login: None,
            games: Vec::new(),
            variables: HashMap::new(),
            date_lines: Vec::new(),
            movelist_game_id: 0,
        }
    }

    /// The command currently in flight.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The current phase of the in-flight command.
    #[must_use]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Start a command.
    ///
    /// Allowed from [`CommandKind::None`] and from the implicit
    /// [`CommandKind::PreLogin`] state; anything else is a usage error.
    /// Resets the phase to 0 and stamps the start time.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CommandInFlight`] if a different command is active.
    pub fn begin(&mut self, request: CommandRequest) -> Result<Vec<CommandAction>, ClientError> {
        if !matches!(self.kind, CommandKind::None | CommandKind::PreLogin) {
            return Err(ClientError::CommandInFlight { active: self.kind });
        }

        self.kind = request.kind();
        self.phase = 0;
        self.started_at = Instant::now();
        debug!(command = %self.kind, "command started");

        match request {
            CommandRequest::Login { username, password } => {
                self.login = Some(LoginState { username, password, text: String::new() });
                Ok(Vec::new())
            },
            CommandRequest::GameList => {
                self.games.clear();
                Ok(vec![CommandAction::Send("games".to_string())])
            },
            CommandRequest::VariableList => {
                self.variables.clear();
                Ok(vec![CommandAction::Send("variables".to_string())])
            },
            CommandRequest::Date => {
                self.date_lines.clear();
                Ok(vec![CommandAction::Send("date".to_string())])
            },
            CommandRequest::MoveList { game_id } => {
                self.movelist_game_id = game_id;
                Ok(vec![CommandAction::Send(format!("moves {game_id}"))])
            },
        }
    }

    /// Abandon the in-flight command (the caller's timeout path).
    ///
    /// A response arriving after this point belongs to no active command
    /// and is dropped by the dispatch loop.
    pub fn reset(&mut self) {
        debug!(
            command = %self.kind,
            elapsed = ?self.started_at.elapsed(),
            "command reset"
        );
        self.kind = CommandKind::None;
        self.phase = 0;
        self.login = None;
    }

    /// Finish the in-flight command with a tagged result.
    fn complete(&mut self, reply: CommandReply) -> CommandAction {
        debug!(
            command = %self.kind,
            elapsed = ?self.started_at.elapsed(),
            ok = reply.is_ok(),
            "command complete"
        );
        self.kind = CommandKind::None;
        self.phase = 0;
        self.login = None;
        CommandAction::Complete(reply)
    }

    /// Feed cumulative text. Only the login exchange is text-driven; its
    /// prompts end without a line terminator, so line framing cannot drive
    /// it and partial arrival must be tolerated.
    pub fn on_text(&mut self, chunk: &str) -> Vec<CommandAction> {
        if self.kind != CommandKind::Login {
            return Vec::new();
        }
        let Some(login) = self.login.as_mut() else {
            return Vec::new();
        };
        login.text.push_str(chunk);

        match self.phase {
            0 => {
                if login.text.ends_with(LOGIN_PROMPT) {
                    let username = login.username.clone();
                    login.text.clear();
                    self.phase = 1;
                    return vec![CommandAction::Send(username)];
                }
                Vec::new()
            },
            1 => {
                let guest = login.username.eq_ignore_ascii_case(GUEST_NAME);
                let bad_character = login.text.contains(BAD_NAME_CHARACTER);
                let unregistered = login.text.contains(NOT_REGISTERED);
                let at_password_prompt = login.text.ends_with(PASSWORD_PROMPT);
                let password = login.password.clone();

                if guest {
                    // Guests are let in on a bare return.
                    let done = self.complete(Ok(CommandData::LoggedIn));
                    return vec![CommandAction::Send(String::new()), done];
                }
                if bad_character {
                    return vec![self.complete(Err(ClientError::Auth(
                        "invalid characters in login name".to_string(),
                    )))];
                }
                if unregistered {
                    return vec![self.complete(Err(ClientError::Auth(
                        "not a registered name".to_string(),
                    )))];
                }
                if at_password_prompt {
                    if let Some(state) = self.login.as_mut() {
                        state.text.clear();
                    }
                    self.phase = 2;
                    return vec![CommandAction::Send(password)];
                }
                Vec::new()
            },
            _ => {
                let success = login.text.contains(SESSION_STARTING);
                let rejected = login.text.contains(INVALID_PASSWORD);

                if success {
                    return vec![self.complete(Ok(CommandData::LoggedIn))];
                }
                if rejected {
                    return vec![self.complete(Err(ClientError::Auth(
                        "Invalid password".to_string(),
                    )))];
                }
                Vec::new()
            },
        }
    }

    /// Feed one complete line to the line-driven command grammars.
    pub fn on_line(&mut self, line: &str) -> Vec<CommandAction> {
        match self.kind {
            CommandKind::GameList => self.on_game_list_line(line),
            CommandKind::VariableList => self.on_variable_line(line),
            CommandKind::Date => self.on_date_line(line),
            CommandKind::MoveList => self.on_movelist_line(line),
            CommandKind::None | CommandKind::PreLogin | CommandKind::Login => Vec::new(),
        }
    }

    fn on_game_list_line(&mut self, line: &str) -> Vec<CommandAction> {
        if self.phase == 0 {
            // "N games displayed." before any row short-circuits an empty
            // list.
            if line.contains(GAMES_DISPLAYED) {
                let games = std::mem::take(&mut self.games);
                return vec![self.complete(Ok(CommandData::Games(games)))];
            }
            if let Ok(listing) = decode_game_listing(line) {
                self.push_listing(listing);
                self.phase = 1;
            }
            return Vec::new();
        }

        match decode_game_listing(line) {
            Ok(listing) => {
                self.push_listing(listing);
                Vec::new()
            },
            // The first row that fails to parse ends the list.
            Err(_) => {
                let games = std::mem::take(&mut self.games);
                vec![self.complete(Ok(CommandData::Games(games)))]
            },
        }
    }

    /// Keep observable rows; unsupported categories are decoded for id
    /// bookkeeping but excluded from the result.
    fn push_listing(&mut self, listing: GameListing) {
        if listing.category.is_observable() {
            self.games.push(listing);
        } else {
            trace!(game_id = listing.id, category = ?listing.category, "unsupported category");
        }
    }

    fn on_variable_line(&mut self, line: &str) -> Vec<CommandAction> {
        if self.phase == 0 {
            if line.contains(VARIABLES_HEADER) {
                self.variables.clear();
                self.phase = 1;
            }
            return Vec::new();
        }

        if line.trim_start().starts_with(FORMULA_PREFIX) {
            let variables = std::mem::take(&mut self.variables);
            return vec![self.complete(Ok(CommandData::Variables(variables)))];
        }
        if line.trim().is_empty() {
            // Blank separators between variable groups.
            return Vec::new();
        }

        let mut any_pairs = false;
        for token in line.split_whitespace() {
            if let Some((name, value)) = token.split_once('=') {
                any_pairs = true;
                self.variables
                    .entry(name.to_ascii_lowercase())
                    .or_insert_with(|| value.to_string());
            }
        }
        if any_pairs {
            Vec::new()
        } else {
            // Sessions without a formula line (guests) end on the first
            // non-assignment line instead.
            let variables = std::mem::take(&mut self.variables);
            vec![self.complete(Ok(CommandData::Variables(variables)))]
        }
    }

    fn on_date_line(&mut self, line: &str) -> Vec<CommandAction> {
        if self.phase == 0 {
            if line.starts_with(LOCAL_TIME_PREFIX) {
                self.date_lines.push(line.to_string());
                self.phase = 1;
            }
            return Vec::new();
        }

        if line.starts_with(GMT_PREFIX) {
            self.date_lines.push(line.to_string());
            let lines = std::mem::take(&mut self.date_lines);
            return vec![self.complete(Ok(CommandData::Date(lines)))];
        }
        if line.starts_with(SERVER_TIME_PREFIX) {
            self.date_lines.push(line.to_string());
        }
        Vec::new()
    }

    fn on_movelist_line(&mut self, line: &str) -> Vec<CommandAction> {
        if self.phase == 0 {
            let header = format!("Movelist for game {}:", self.movelist_game_id);
            if line.contains(&header) {
                self.phase = 1;
            }
            return Vec::new();
        }

        if line.trim_start().starts_with(MOVELIST_SEPARATOR) {
            let game_id = self.movelist_game_id;
            return vec![self.complete(Ok(CommandData::MoveListReady(game_id)))];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begun(machine: &mut CommandMachine, request: CommandRequest) -> Vec<CommandAction> {
        machine.begin(request).expect("begin should succeed")
    }

    fn login_request() -> CommandRequest {
        CommandRequest::Login { username: "Newton".to_string(), password: "apple".to_string() }
    }

    #[test]
    fn second_command_while_active_is_rejected() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::GameList);

        let err = machine.begin(CommandRequest::Date).unwrap_err();
        assert_eq!(err, ClientError::CommandInFlight { active: CommandKind::GameList });
    }

    #[test]
    fn completion_allows_the_next_command() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::GameList);
        let actions = machine.on_line("No games to display.");
        assert!(matches!(actions.as_slice(), [CommandAction::Complete(Ok(_))]));

        assert_eq!(machine.kind(), CommandKind::None);
        begun(&mut machine, CommandRequest::Date);
    }

    #[test]
    fn reset_allows_the_next_command() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::GameList);
        machine.reset();
        begun(&mut machine, CommandRequest::Date);
    }

    #[test]
    fn begin_is_allowed_while_pre_login() {
        let mut machine = CommandMachine::new();
        assert_eq!(machine.kind(), CommandKind::PreLogin);
        begun(&mut machine, login_request());
    }

    #[test]
    fn login_happy_path() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, login_request());

        // Prompt arrives split across chunks.
        assert_eq!(machine.on_text("Welcome!\nlog"), Vec::new());
        let actions = machine.on_text("in: ");
        assert_eq!(actions, vec![CommandAction::Send("Newton".to_string())]);

        let actions = machine.on_text("password: ");
        assert_eq!(actions, vec![CommandAction::Send("apple".to_string())]);

        let actions = machine.on_text("**** Starting session as Newton ****\n");
        assert!(matches!(
            actions.as_slice(),
            [CommandAction::Complete(Ok(CommandData::LoggedIn))]
        ));
        assert_eq!(machine.kind(), CommandKind::None);
    }

    #[test]
    fn login_guest_sends_bare_return() {
        let mut machine = CommandMachine::new();
        begun(
            &mut machine,
            CommandRequest::Login { username: "guest".to_string(), password: String::new() },
        );

        machine.on_text("login: ");
        let actions = machine.on_text("Press return to enter the server as \"GuestXYZW\": ");
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], CommandAction::Send(String::new()));
        assert!(matches!(
            actions[1],
            CommandAction::Complete(Ok(CommandData::LoggedIn))
        ));
    }

    #[test]
    fn login_unregistered_name_fails() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, login_request());

        machine.on_text("login: ");
        let actions = machine.on_text("\"Newton\" is not a registered name.\n");
        assert!(matches!(
            actions.as_slice(),
            [CommandAction::Complete(Err(ClientError::Auth(_)))]
        ));
    }

    #[test]
    fn login_invalid_password_fails() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, login_request());

        machine.on_text("login: ");
        machine.on_text("password: ");
        let actions = machine.on_text("**** Invalid password! ****\nlogin: ");
        assert!(matches!(
            actions.as_slice(),
            [CommandAction::Complete(Err(ClientError::Auth(_)))]
        ));
    }

    #[test]
    fn game_list_collects_until_unparseable_row() {
        let mut machine = CommandMachine::new();
        let actions = begun(&mut machine, CommandRequest::GameList);
        assert_eq!(actions, vec![CommandAction::Send("games".to_string())]);

        machine.on_line("");
        machine.on_line(" 93 1723 alpha 1734 beta [ sr 20 10] 5:11 - 6:48 (18-18) W: 19");
        assert_eq!(machine.phase(), 1);
        machine.on_line(" 94 ++++ gamma ---- delta [ bu 5 0] 0:30 - 1:02 (39-39) B: 4");

        let actions = machine.on_line("  2 games displayed.");
        let [CommandAction::Complete(Ok(CommandData::Games(games)))] = actions.as_slice() else {
            panic!("expected completion, got {actions:?}");
        };
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].id, 93);
        assert_eq!(games[1].id, 94);
    }

    #[test]
    fn game_list_excludes_unsupported_categories() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::GameList);

        machine.on_line(" 10 1800 a 1800 b [ sr 15 0] 0:10 - 0:11 (39-39) W: 1");
        // A bughouse row is bookkept but excluded, and must not end the list.
        machine.on_line(" 11 1800 c 1800 d [ Br 3 0] 0:10 - 0:11 (39-39) W: 1");
        machine.on_line(" 12 1800 e 1800 f [ lr 1 0] 0:10 - 0:11 (39-39) B: 2");

        let actions = machine.on_line("  3 games displayed.");
        let [CommandAction::Complete(Ok(CommandData::Games(games)))] = actions.as_slice() else {
            panic!("expected completion, got {actions:?}");
        };
        let ids: Vec<u32> = games.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![10, 12]);
    }

    #[test]
    fn empty_game_list_short_circuits() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::GameList);

        let actions = machine.on_line("  0 games displayed.");
        let [CommandAction::Complete(Ok(CommandData::Games(games)))] = actions.as_slice() else {
            panic!("expected completion, got {actions:?}");
        };
        assert!(games.is_empty());
    }

    #[test]
    fn variables_first_occurrence_wins_and_formula_ends() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::VariableList);

        machine.on_line("Variable settings of Newton:");
        machine.on_line("");
        machine.on_line("time=2        private=0     shout=1");
        machine.on_line("inc=12        Shout=9");
        let actions = machine.on_line("Formula: rated");

        let [CommandAction::Complete(Ok(CommandData::Variables(vars)))] = actions.as_slice()
        else {
            panic!("expected completion, got {actions:?}");
        };
        assert_eq!(vars.len(), 4);
        assert_eq!(vars.get("shout").map(String::as_str), Some("1"));
        assert_eq!(vars.get("inc").map(String::as_str), Some("12"));
    }

    #[test]
    fn variables_without_formula_end_on_plain_line() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::VariableList);

        machine.on_line("Variable settings of GuestXYZW:");
        machine.on_line("time=2 inc=12");
        let actions = machine.on_line("fics%");
        assert!(matches!(
            actions.as_slice(),
            [CommandAction::Complete(Ok(CommandData::Variables(_)))]
        ));
    }

    #[test]
    fn date_captures_three_lines() {
        let mut machine = CommandMachine::new();
        begun(&mut machine, CommandRequest::Date);

        machine.on_line("noise");
        machine.on_line("Local time     - Thu Aug  6, 14:02 PDT 2026");
        machine.on_line("Server time    - Thu Aug  6, 21:02 GMT 2026");
        let actions = machine.on_line("GMT            - Thu Aug  6, 21:02 GMT 2026");

        let [CommandAction::Complete(Ok(CommandData::Date(lines)))] = actions.as_slice() else {
            panic!("expected completion, got {actions:?}");
        };
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Local time"));
        assert!(lines[2].starts_with("GMT"));
    }

    #[test]
    fn movelist_completes_on_separator() {
        let mut machine = CommandMachine::new();
        let actions = begun(&mut machine, CommandRequest::MoveList { game_id: 42 });
        assert_eq!(actions, vec![CommandAction::Send("moves 42".to_string())]);

        machine.on_line("Movelist for game 41:");
        assert_eq!(machine.phase(), 0);
        machine.on_line("Movelist for game 42:");
        assert_eq!(machine.phase(), 1);

        machine.on_line("white (1723) vs. black (1734) --- rated standard match");
        let actions = machine.on_line("---------------------------------------");
        assert!(matches!(
            actions.as_slice(),
            [CommandAction::Complete(Ok(CommandData::MoveListReady(42)))]
        ));
    }
}
