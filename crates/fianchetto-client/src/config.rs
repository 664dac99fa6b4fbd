//! Engine configuration.

use std::time::Duration;

/// Default deadline for commands issued without an explicit timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the decoded-text channel between the read task and
/// the dispatch loop.
pub const DEFAULT_CHUNK_CAPACITY: usize = 64;

/// Default capacity of the command-request channel.
pub const DEFAULT_REQUEST_CAPACITY: usize = 8;

/// Engine configuration.
///
/// The quiet-mode lists name the server settings `set_quiet_mode` applies:
/// `settings` go through `set` (their prior values are captured and restored
/// on disconnect), `interface_settings` go through `iset` (interface-scoped,
/// nothing to restore).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline used by internal commands (e.g. the variable capture inside
    /// `set_quiet_mode`).
    pub command_timeout: Duration,
    /// Capacity of the decoded-text channel.
    pub chunk_capacity: usize,
    /// Capacity of the command-request channel.
    pub request_capacity: usize,
    /// `set` variables applied by quiet mode, with the values to apply.
    pub settings: Vec<(String, String)>,
    /// `iset` variables applied by quiet mode.
    pub interface_settings: Vec<(String, String)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let set = |name: &str, value: &str| (name.to_string(), value.to_string());
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            settings: vec![
                // Machine-parseable live updates.
                set("style", "12"),
                // Noise channels off.
                set("shout", "0"),
                set("cshout", "0"),
                set("gin", "0"),
                set("seek", "0"),
            ],
            interface_settings: vec![
                // Movelist backfill in the live-update format.
                set("ms", "1"),
            ],
        }
    }
}
