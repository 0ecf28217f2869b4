//! Lifecycle observers.
//!
//! The orchestrator emits a [`LifecycleEvent`] at every phase and stage
//! boundary. Observers are invoked synchronously, in registration order, and
//! cannot influence control flow.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::lifecycle::state::Subsystem;

/// One barrier-separated step of the run pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DbConnect,
    RunLoggers,
    RunModules,
    RunServer,
}

impl Stage {
    pub const PIPELINE: [Stage; 4] = [
        Stage::DbConnect,
        Stage::RunLoggers,
        Stage::RunModules,
        Stage::RunServer,
    ];

    /// Subsystem whose state the stage drives.
    pub fn subsystem(self) -> Subsystem {
        match self {
            Stage::DbConnect => Subsystem::Db,
            Stage::RunLoggers => Subsystem::Loggers,
            Stage::RunModules => Subsystem::Modules,
            Stage::RunServer => Subsystem::Server,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DbConnect => "db-connect",
            Stage::RunLoggers => "run-loggers",
            Stage::RunModules => "run-modules",
            Stage::RunServer => "run-server",
        };
        f.write_str(name)
    }
}

/// Result of a phase or task, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    BeforeInit,
    PhaseFinished {
        subsystem: Subsystem,
        outcome: Outcome,
    },
    AfterInit {
        errors: usize,
    },
    BeforeRun,
    BeforeStage(Stage),
    TaskFinished {
        stage: Stage,
        name: String,
        detail: Option<String>,
        outcome: Outcome,
    },
    StageFinished {
        stage: Stage,
        tasks: usize,
        failed: usize,
    },
    ServerListening {
        addr: SocketAddr,
    },
    AfterRun {
        ok: bool,
    },
}

pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

impl<F> LifecycleObserver for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct Hooks {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        tracing::debug!(event = ?event, "Lifecycle event");
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_observers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();
        for id in 0..3 {
            let log = log.clone();
            hooks.push(Arc::new(move |event: &LifecycleEvent| {
                if matches!(event, LifecycleEvent::BeforeRun) {
                    log.lock().unwrap().push(id);
                }
            }));
        }

        hooks.emit(LifecycleEvent::BeforeRun);
        hooks.emit(LifecycleEvent::BeforeInit);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_stage_subsystems() {
        let subsystems: Vec<_> = Stage::PIPELINE.iter().map(|s| s.subsystem()).collect();
        assert_eq!(
            subsystems,
            vec![Subsystem::Db, Subsystem::Loggers, Subsystem::Modules, Subsystem::Server]
        );
    }
}
