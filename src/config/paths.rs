//! Project directory resolution.
//!
//! Configured paths whose first component is `.` resolve against the
//! directory holding the configuration file, `..` against its parent, and
//! anything else is taken verbatim. Absent paths derive from their siblings.
//! A relative configuration directory is first anchored at the working
//! directory, so every resolved path is absolute.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

/// Resolved directory layout of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathConfig {
    pub project: PathBuf,
    pub app: PathBuf,
    pub modules: PathBuf,
    pub config: PathBuf,
    pub routes: PathBuf,
    /// Framework root: the directory of the running executable unless configured.
    pub swift: PathBuf,
    /// Framework library directory, `<swift>/lib` unless configured.
    pub lib: PathBuf,
}

impl PathConfig {
    /// Resolve the `path` section of a configuration relative to `config_dir`.
    pub fn resolve(section: Option<&Map<String, Value>>, config_dir: &Path) -> Self {
        let config_dir = normalize(&absolute(config_dir));
        let configured = |key: &str| {
            section
                .and_then(|s| s.get(key))
                .and_then(Value::as_str)
                .filter(|raw| !raw.is_empty())
                .map(|raw| resolve_relative(raw, &config_dir))
        };

        let project = configured("project").unwrap_or_else(|| normalize(&config_dir.join("../..")));
        let app = configured("app").unwrap_or_else(|| project.join("app"));
        let modules = configured("modules").unwrap_or_else(|| app.join("modules"));
        let routes = configured("routes").unwrap_or_else(|| config_dir.clone());
        let swift = configured("swift").unwrap_or_else(|| framework_root(&project));
        let lib = configured("lib").unwrap_or_else(|| swift.join("lib"));

        Self {
            project,
            app,
            modules,
            config: config_dir,
            routes,
            swift,
            lib,
        }
    }

    /// Record the resolved layout in the `path` section of `config`.
    pub fn write_into(&self, config: &mut Map<String, Value>) {
        let mut section = Map::new();
        for (key, path) in [
            ("project", &self.project),
            ("app", &self.app),
            ("modules", &self.modules),
            ("config", &self.config),
            ("routes", &self.routes),
            ("swift", &self.swift),
            ("lib", &self.lib),
        ] {
            section.insert(key.to_string(), Value::String(path.display().to_string()));
        }
        config.insert("path".to_string(), Value::Object(section));
    }

    /// Directory holding the view templates.
    pub fn views(&self) -> PathBuf {
        self.app.join("view")
    }
}

/// Anchor a relative path at the working directory.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Working directory unavailable, keeping relative path");
            path.to_path_buf()
        }
    }
}

/// Directory of the running executable, falling back to `project`.
fn framework_root(project: &Path) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| project.to_path_buf())
}

/// Resolve `raw` against `base` when it starts with `.` or `..`.
pub fn resolve_relative(raw: &str, base: &Path) -> PathBuf {
    let path = Path::new(raw);
    match path.components().next() {
        Some(Component::CurDir | Component::ParentDir) => normalize(&base.join(path)),
        _ => path.to_path_buf(),
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
