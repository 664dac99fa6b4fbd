//! Registry of observed games.
//!
//! A plain map from game id to session; the engine holds it behind one
//! mutex shared by the dispatch loop (routing unsolicited rows), caller
//! tasks (observe/unobserve) and session watchdogs (timeout termination).
//! Lookups hand out `Arc` clones so callers can release the registry lock
//! before touching a session.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use fianchetto_proto::TerminationKind;
use tracing::debug;

use crate::{board::BoardDriver, error::ClientError, session::GameSession};

/// Map of currently observed games.
#[derive(Default)]
pub struct GameRegistry {
    games: HashMap<u32, Arc<GameSession>>,
}

impl GameRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for observation.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyObserved`] if the game id is taken.
    pub fn register(&mut self, session: Arc<GameSession>) -> Result<(), ClientError> {
        let game_id = session.game_id();
        match self.games.entry(game_id) {
            Entry::Occupied(_) => Err(ClientError::AlreadyObserved { game_id }),
            Entry::Vacant(slot) => {
                debug!(game_id, "game registered");
                slot.insert(session);
                Ok(())
            },
        }
    }

    /// Remove a session. `None` if the id was not registered.
    pub fn unregister(&mut self, game_id: u32) -> Option<Arc<GameSession>> {
        let session = self.games.remove(&game_id);
        if session.is_some() {
            debug!(game_id, remaining = self.games.len(), "game unregistered");
        }
        session
    }

    /// The session observing this game id.
    #[must_use]
    pub fn get(&self, game_id: u32) -> Option<Arc<GameSession>> {
        self.games.get(&game_id).cloned()
    }

    /// The session attached to this board handle (linear scan).
    #[must_use]
    pub fn find_by_board(&self, board: &Arc<dyn BoardDriver>) -> Option<Arc<GameSession>> {
        self.games.values().find(|session| Arc::ptr_eq(session.board(), board)).cloned()
    }

    /// Number of observed games.
    #[must_use]
    pub fn count(&self) -> usize {
        self.games.len()
    }

    /// Whether any game is currently observed. Drives the phase-0 dispatch
    /// bypass in the engine.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        !self.games.is_empty()
    }

    /// Unregister a game and forward the outcome to its session.
    ///
    /// Returns `false` if the id was not registered.
    pub fn terminate(&mut self, game_id: u32, kind: TerminationKind, comment: &str) -> bool {
        match self.unregister(game_id) {
            Some(session) => {
                session.terminate(kind, comment);
                true
            },
            None => false,
        }
    }
}
