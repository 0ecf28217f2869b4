//! Shared fixtures and mock collaborators for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::Value;
use tempfile::TempDir;

use swift_mvc::error::{Error, PluginError, Result};
use swift_mvc::http::RouteTarget;
use swift_mvc::lifecycle::{LifecycleEvent, LifecycleObserver};
use swift_mvc::plugins::{ConnectionParams, DbAdapter, DbManager, Module};
use swift_mvc::{ApplicationBuilder, Application, Subsystem};

/// On-disk project: `<root>/app/config/{config,routes}.json`.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new(config: Value, routes: Value) -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write("app/config/config.json", &config.to_string());
        fixture.write("app/config/routes.json", &routes.to_string());
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("app/config")
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn mkdir(&self, relative: &str) {
        fs::create_dir_all(self.root().join(relative)).unwrap();
    }

    /// Quiet builder bound to this project, immune to `PORT`/`SWIFT_ENV`.
    pub fn builder(&self) -> ApplicationBuilder {
        Application::builder()
            .base_dir(self.root())
            .env("development")
            .port_override(None)
            .quiet(true)
    }
}

/// Shared counters observed by the mocks.
#[derive(Default)]
pub struct Probe {
    pub connect_attempts: AtomicUsize,
    pub module_runs: AtomicUsize,
}

impl Probe {
    pub fn connects(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.module_runs.load(Ordering::SeqCst)
    }
}

/// Adapter whose connections fail when their parameters contain `"fail": true`.
pub struct MockAdapter {
    name: String,
    params: Mutex<IndexMap<String, ConnectionParams>>,
    probe: Arc<Probe>,
}

#[async_trait]
impl DbAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_connection_params(&self, connection: &str, params: ConnectionParams) -> Result<()> {
        self.params
            .lock()
            .unwrap()
            .insert(connection.to_string(), params);
        Ok(())
    }

    fn connection_params(&self) -> IndexMap<String, ConnectionParams> {
        self.params.lock().unwrap().clone()
    }

    async fn connect_one(&self, connection: &str) -> Result<()> {
        self.probe.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let params = self.params.lock().unwrap().get(connection).cloned();
        match params {
            Some(p) if p.get("fail") == Some(&Value::Bool(true)) => Err(Error::runtime(
                Subsystem::Db,
                format!("{}.{connection}", self.name),
                "connection refused",
            )),
            Some(_) => Ok(()),
            None => Err(Error::runtime(Subsystem::Db, connection, "unknown connection")),
        }
    }
}

/// Db manager supporting the `mock` adapter type only.
pub struct MockDbManager {
    adapters: Vec<Arc<MockAdapter>>,
    probe: Arc<Probe>,
}

impl MockDbManager {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            adapters: Vec::new(),
            probe,
        }
    }
}

impl DbManager for MockDbManager {
    fn create_adapter(&mut self, kind: &str, name: &str) -> Result<Arc<dyn DbAdapter>> {
        if kind != "mock" {
            return Err(PluginError::UnknownType {
                manager: "db adapter",
                kind: kind.to_string(),
            }
            .into());
        }
        let adapter = Arc::new(MockAdapter {
            name: name.to_string(),
            params: Mutex::new(IndexMap::new()),
            probe: self.probe.clone(),
        });
        self.adapters.push(adapter.clone());
        Ok(adapter)
    }

    fn adapters(&self) -> Vec<Arc<dyn DbAdapter>> {
        self.adapters
            .iter()
            .map(|a| a.clone() as Arc<dyn DbAdapter>)
            .collect()
    }
}

/// Module that counts its starts and echoes `controller#action` (plus `:id`).
pub struct EchoModule {
    name: String,
    path: PathBuf,
    probe: Arc<Probe>,
}

impl EchoModule {
    pub fn new(name: &str, probe: Arc<Probe>) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from("/virtual").join(name),
            probe,
        }
    }
}

#[async_trait]
impl Module for EchoModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn module_path(&self) -> &Path {
        &self.path
    }

    async fn run(&self) -> Result<()> {
        self.probe.module_runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle(&self, target: &RouteTarget, req: Request<Body>) -> Response {
        let last = req.uri().path().rsplit('/').next().unwrap_or_default().to_string();
        format!("{}#{} {}", target.controller, target.action, last).into_response()
    }
}

/// Observer recording every lifecycle event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl LifecycleObserver for Recorder {
    fn on_event(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
