//! Subsystem lifecycle state machine.
//!
//! # States
//! ```text
//! Idle ──► Initializing ──► Initialized ──► Starting ──► Running
//!               │                               │
//!               └────────► Failed ◄─────────────┘
//! ```
//!
//! `Initializing` and `Starting` are transient: other callers wait for them
//! to settle (see [`StatusBoard::wait_settled`]) and re-validate instead of
//! re-entering. All transitions go through [`StatusBoard`], which checks and
//! applies them atomically inside a `watch` channel.

use std::fmt;

use tokio::sync::watch;

use crate::error::StateError;

/// Subsystems tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    App,
    Core,
    Db,
    Loggers,
    Helpers,
    Modules,
    Server,
}

impl Subsystem {
    pub const ALL: [Subsystem; 7] = [
        Subsystem::App,
        Subsystem::Core,
        Subsystem::Db,
        Subsystem::Loggers,
        Subsystem::Helpers,
        Subsystem::Modules,
        Subsystem::Server,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::App => "app",
            Subsystem::Core => "core",
            Subsystem::Db => "db",
            Subsystem::Loggers => "loggers",
            Subsystem::Helpers => "helpers",
            Subsystem::Modules => "modules",
            Subsystem::Server => "server",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubsystemState {
    #[default]
    Idle,
    Initializing,
    Initialized,
    Starting,
    Running,
    Failed,
}

impl SubsystemState {
    /// Barrier states other callers must wait on.
    pub fn is_transient(self) -> bool {
        matches!(self, SubsystemState::Initializing | SubsystemState::Starting)
    }

    /// True once initialization has completed successfully, including later states.
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            SubsystemState::Initialized | SubsystemState::Starting | SubsystemState::Running
        )
    }

    pub fn can_transition_to(self, next: SubsystemState) -> bool {
        use SubsystemState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Initialized)
                | (Initializing, Failed)
                | (Initialized, Starting)
                | (Starting, Running)
                | (Starting, Failed)
        )
    }
}

impl fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsystemState::Idle => "idle",
            SubsystemState::Initializing => "initializing",
            SubsystemState::Initialized => "initialized",
            SubsystemState::Starting => "starting",
            SubsystemState::Running => "running",
            SubsystemState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of every subsystem's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSet([SubsystemState; 7]);

impl StatusSet {
    pub fn get(&self, subsystem: Subsystem) -> SubsystemState {
        self.0[subsystem.index()]
    }

    fn set(&mut self, subsystem: Subsystem, state: SubsystemState) {
        self.0[subsystem.index()] = state;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Subsystem, SubsystemState)> + '_ {
        Subsystem::ALL.iter().map(|s| (*s, self.get(*s)))
    }
}

/// Owner of the status set. Only the orchestrator mutates it.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<StatusSet>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSet::default());
        Self { tx }
    }

    pub fn state(&self, subsystem: Subsystem) -> SubsystemState {
        self.tx.borrow().get(subsystem)
    }

    pub fn snapshot(&self) -> StatusSet {
        *self.tx.borrow()
    }

    /// Apply a validated transition, returning the previous state.
    pub fn transition(
        &self,
        subsystem: Subsystem,
        to: SubsystemState,
    ) -> Result<SubsystemState, StateError> {
        self.apply(subsystem, |from| {
            if from.can_transition_to(to) {
                Ok(to)
            } else {
                Err(StateError::InvalidTransition { subsystem, from, to })
            }
        })
    }

    /// `Idle → Initializing`, rejecting every other starting point with the
    /// error a caller of an init operation expects.
    pub fn begin_init(&self, subsystem: Subsystem) -> Result<(), StateError> {
        self.apply(subsystem, |from| init_guard(subsystem, from))
            .map(|_| ())
    }

    /// The check [`begin_init`](Self::begin_init) performs, without claiming.
    pub fn check_init(&self, subsystem: Subsystem) -> Result<(), StateError> {
        init_guard(subsystem, self.state(subsystem)).map(|_| ())
    }

    /// `Initialized → Starting`, the run-side counterpart of [`begin_init`](Self::begin_init).
    pub fn begin_start(&self, subsystem: Subsystem) -> Result<(), StateError> {
        self.apply(subsystem, |from| match from {
            SubsystemState::Initialized => Ok(SubsystemState::Starting),
            SubsystemState::Idle | SubsystemState::Initializing => {
                Err(StateError::NotInitialized(subsystem))
            }
            SubsystemState::Starting => Err(StateError::AlreadyStarting(subsystem)),
            SubsystemState::Running => Err(StateError::AlreadyRunning(subsystem)),
            SubsystemState::Failed => Err(StateError::Failed(subsystem)),
        })
        .map(|_| ())
    }

    /// Leave a transient state with the given outcome.
    pub fn finish(&self, subsystem: Subsystem, ok: bool) -> Result<SubsystemState, StateError> {
        self.apply(subsystem, |from| match (from, ok) {
            (SubsystemState::Initializing, true) => Ok(SubsystemState::Initialized),
            (SubsystemState::Starting, true) => Ok(SubsystemState::Running),
            (SubsystemState::Initializing | SubsystemState::Starting, false) => {
                Ok(SubsystemState::Failed)
            }
            (from, _) => Err(StateError::InvalidTransition {
                subsystem,
                from,
                to: if ok { SubsystemState::Running } else { SubsystemState::Failed },
            }),
        })
    }

    /// Wait until the subsystem is no longer in a transient state and return
    /// the settled state.
    #[allow(clippy::let_and_return)]
    pub async fn wait_settled(&self, subsystem: Subsystem) -> SubsystemState {
        // the borrowed snapshot must drop before `rx`
        let mut rx = self.tx.subscribe();
        let settled = match rx.wait_for(|set| !set.get(subsystem).is_transient()).await {
            Ok(set) => set.get(subsystem),
            Err(_) => self.state(subsystem),
        };
        settled
    }

    fn apply<F>(&self, subsystem: Subsystem, decide: F) -> Result<SubsystemState, StateError>
    where
        F: FnOnce(SubsystemState) -> Result<SubsystemState, StateError>,
    {
        let mut outcome = None;
        self.tx.send_if_modified(|set| {
            let from = set.get(subsystem);
            match decide(from) {
                Ok(to) => {
                    set.set(subsystem, to);
                    tracing::trace!(subsystem = %subsystem, from = %from, to = %to, "State transition");
                    outcome = Some(Ok(from));
                    true
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    false
                }
            }
        });
        outcome.unwrap_or(Err(StateError::Failed(subsystem)))
    }
}

fn init_guard(subsystem: Subsystem, from: SubsystemState) -> Result<SubsystemState, StateError> {
    match from {
        SubsystemState::Idle => Ok(SubsystemState::Initializing),
        SubsystemState::Initializing => Err(StateError::AlreadyInitializing(subsystem)),
        SubsystemState::Initialized => Err(StateError::AlreadyInitialized(subsystem)),
        SubsystemState::Starting => Err(StateError::AlreadyStarting(subsystem)),
        SubsystemState::Running => Err(StateError::AlreadyRunning(subsystem)),
        SubsystemState::Failed => Err(StateError::Failed(subsystem)),
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_transition_table() {
        use SubsystemState::*;
        assert!(Idle.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Failed));
        assert!(Starting.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Running));
        assert!(!Initialized.can_transition_to(Initializing));
        assert!(!Failed.can_transition_to(Initializing));
        assert!(!Running.can_transition_to(Starting));
    }

    #[test]
    fn test_init_guards() {
        let board = StatusBoard::new();
        board.begin_init(Subsystem::Core).unwrap();
        assert_eq!(
            board.begin_init(Subsystem::Core),
            Err(StateError::AlreadyInitializing(Subsystem::Core))
        );
        board.finish(Subsystem::Core, true).unwrap();
        assert_eq!(
            board.begin_init(Subsystem::Core),
            Err(StateError::AlreadyInitialized(Subsystem::Core))
        );
        assert_eq!(board.state(Subsystem::Core), SubsystemState::Initialized);
        // untouched subsystems stay idle
        assert_eq!(board.state(Subsystem::Db), SubsystemState::Idle);
    }

    #[test]
    fn test_check_init_leaves_state_alone() {
        let board = StatusBoard::new();
        board.check_init(Subsystem::Db).unwrap();
        assert_eq!(board.state(Subsystem::Db), SubsystemState::Idle);

        board.begin_init(Subsystem::Db).unwrap();
        assert_eq!(
            board.check_init(Subsystem::Db),
            Err(StateError::AlreadyInitializing(Subsystem::Db))
        );
        assert_eq!(board.state(Subsystem::Db), SubsystemState::Initializing);
    }

    #[test]
    fn test_start_guards() {
        let board = StatusBoard::new();
        assert_eq!(
            board.begin_start(Subsystem::Server),
            Err(StateError::NotInitialized(Subsystem::Server))
        );
        board.begin_init(Subsystem::Server).unwrap();
        board.finish(Subsystem::Server, true).unwrap();
        board.begin_start(Subsystem::Server).unwrap();
        assert_eq!(
            board.begin_start(Subsystem::Server),
            Err(StateError::AlreadyStarting(Subsystem::Server))
        );
        board.finish(Subsystem::Server, false).unwrap();
        assert_eq!(board.state(Subsystem::Server), SubsystemState::Failed);
        assert_eq!(
            board.begin_start(Subsystem::Server),
            Err(StateError::Failed(Subsystem::Server))
        );
    }

    #[test]
    fn test_finish_requires_transient_state() {
        let board = StatusBoard::new();
        assert!(matches!(
            board.finish(Subsystem::Db, true),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_settled_resolves_after_finish() {
        let board = Arc::new(StatusBoard::new());
        board.begin_init(Subsystem::Core).unwrap();

        let waiter = {
            let board = board.clone();
            tokio::spawn(async move { board.wait_settled(Subsystem::Core).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        board.finish(Subsystem::Core, false).unwrap();
        assert_eq!(waiter.await.unwrap(), SubsystemState::Failed);
    }

    #[tokio::test]
    async fn test_wait_settled_returns_immediately_when_idle() {
        let board = StatusBoard::new();
        assert_eq!(board.wait_settled(Subsystem::App).await, SubsystemState::Idle);
    }
}
