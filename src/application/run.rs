//! Startup pipeline.
//!
//! ```text
//! db-connect ──▶ run-loggers ──▶ run-modules ──▶ run-server
//! (one task per connection / logger / module, joined before the next stage)
//! ```
//!
//! Siblings inside a stage always run to completion. The first stage with a
//! failed task marks its subsystem and the application `Failed`, and no later
//! stage is started.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};

use crate::application::Application;
use crate::error::{Error, Result, StateError};
use crate::lifecycle::{LifecycleEvent, Outcome, Stage, Subsystem, SubsystemState};

/// Completion record of one stage task.
struct TaskReport {
    name: String,
    detail: Option<String>,
    result: Result<()>,
}

impl Application {
    /// Start every subsystem.
    pub async fn run(&self) -> Result<()> {
        match self.board.state(Subsystem::App) {
            SubsystemState::Running => return Err(StateError::AlreadyRunning(Subsystem::App).into()),
            SubsystemState::Starting => return Err(StateError::AlreadyStarting(Subsystem::App).into()),
            _ => {}
        }

        let settled = self.board.wait_settled(Subsystem::App).await;
        if settled == SubsystemState::Idle {
            return Err(StateError::NotInitialized(Subsystem::App).into());
        }
        let init_errors = super::lock(&self.init_errors).len();
        if settled == SubsystemState::Initialized && init_errors > 0 {
            return Err(StateError::InitFailed(init_errors).into());
        }
        self.board.begin_start(Subsystem::App)?;

        self.hooks.emit(LifecycleEvent::BeforeRun);
        tracing::info!("Starting application");

        for stage in Stage::PIPELINE {
            if let Err(e) = self.run_stage(stage).await {
                if let Err(state) = self.board.finish(Subsystem::App, false) {
                    tracing::error!(error = %state, "Unexpected application state");
                }
                tracing::error!(stage = %stage, error = %e, "Application failed to start");
                self.hooks.emit(LifecycleEvent::AfterRun { ok: false });
                return Err(e);
            }
        }

        self.board.finish(Subsystem::App, true)?;
        self.hooks.emit(LifecycleEvent::AfterRun { ok: true });
        tracing::info!(address = ?self.server_addr(), "Application running");
        Ok(())
    }

    async fn run_stage(&self, stage: Stage) -> Result<()> {
        let subsystem = stage.subsystem();
        self.board.begin_start(subsystem)?;

        let tasks = match stage {
            Stage::DbConnect => self.db_tasks(),
            Stage::RunLoggers => self.logger_tasks(),
            Stage::RunModules => self.module_tasks(),
            Stage::RunServer => vec![self.server_task()],
        };
        let total = tasks.len();
        if total > 0 {
            self.hooks.emit(LifecycleEvent::BeforeStage(stage));
        }
        tracing::debug!(stage = %stage, tasks = total, "Stage started");

        let mut errors = Vec::new();
        for report in join_all(tasks).await {
            let outcome = match &report.result {
                Ok(()) => Outcome::Done,
                Err(e) => Outcome::Failed(e.to_string()),
            };
            if let Err(e) = report.result {
                tracing::warn!(stage = %stage, task = %report.name, error = %e, "Task failed");
                errors.push(e);
            }
            self.hooks.emit(LifecycleEvent::TaskFinished {
                stage,
                name: report.name,
                detail: report.detail,
                outcome,
            });
        }

        let failed = errors.len();
        if total > 0 {
            self.hooks.emit(LifecycleEvent::StageFinished {
                stage,
                tasks: total,
                failed,
            });
        }
        self.board.finish(subsystem, failed == 0)?;
        tracing::info!(stage = %stage, tasks = total, failed, "Stage finished");
        Error::from_many(errors)
    }

    fn db_tasks(&self) -> Vec<BoxFuture<'_, TaskReport>> {
        let plugins = self.plugins();
        let Some(manager) = plugins.db_manager() else {
            return Vec::new();
        };

        let mut tasks: Vec<BoxFuture<'_, TaskReport>> = Vec::new();
        for adapter in manager.adapters() {
            for (connection, params) in adapter.connection_params() {
                let adapter = Arc::clone(&adapter);
                let detail = params.uri().map(str::to_string);
                tasks.push(Box::pin(async move {
                    let result = adapter.connect_one(&connection).await;
                    TaskReport {
                        name: format!("{}.{}", adapter.name(), connection),
                        detail,
                        result,
                    }
                }));
            }
        }
        tasks
    }

    fn logger_tasks(&self) -> Vec<BoxFuture<'_, TaskReport>> {
        let plugins = self.plugins();
        let Some(manager) = plugins.logger_manager() else {
            return Vec::new();
        };

        let mut tasks: Vec<BoxFuture<'_, TaskReport>> = Vec::new();
        for logger in manager.loggers() {
            if logger.is_disabled() {
                tracing::debug!(logger = %logger.name(), "Logger disabled, not starting");
                continue;
            }
            tasks.push(Box::pin(async move {
                let result = logger.run().await;
                TaskReport {
                    name: logger.name().to_string(),
                    detail: logger.path_to_log().map(|p| p.display().to_string()),
                    result,
                }
            }));
        }
        tasks
    }

    fn module_tasks(&self) -> Vec<BoxFuture<'_, TaskReport>> {
        let modules = self.plugins().module_manager().modules();

        let mut tasks: Vec<BoxFuture<'_, TaskReport>> = Vec::new();
        for module in modules.into_values() {
            tasks.push(Box::pin(async move {
                let result = module.run().await;
                TaskReport {
                    name: module.name().to_string(),
                    detail: Some(module.module_path().display().to_string()),
                    result,
                }
            }));
        }
        tasks
    }

    fn server_task(&self) -> BoxFuture<'_, TaskReport> {
        Box::pin(async move {
            let chain = super::lock(&self.middleware).clone();
            if let Some(listener) = self.listener() {
                listener.set_middleware(chain);
            }

            let mut server = self.server.lock().await;
            let result = match server.run().await {
                Ok(addr) => {
                    self.server_addr.store(Some(Arc::new(addr)));
                    self.hooks.emit(LifecycleEvent::ServerListening { addr });
                    Ok(())
                }
                Err(e) => Err(Error::from(e)),
            };
            TaskReport {
                name: "server".to_string(),
                detail: Some(format!("{}:{}", server.ip(), server.port())),
                result,
            }
        })
    }
}
