//! Project resource resolution.
//!
//! Resource paths are written relative to the project layout:
//!
//! | Form              | Resolves to                              |
//! |-------------------|------------------------------------------|
//! | `:app/x`          | `<app>/x`                                |
//! | `:modules/x`      | `<modules>/x`                            |
//! | `:config/x`       | `<config>/x`                             |
//! | `:swift/x`        | `<framework root>/x`                     |
//! | `:lib/x`          | `<framework lib>/x`                      |
//! | `[a.b]/x`         | `<modules>/a/modules/b/x`                |
//! | anything else     | `<project>/x`                            |
//!
//! A path without an extension is probed as `.json`, then `.toml`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::loader;
use crate::config::paths::{normalize, PathConfig};
use crate::error::{Error, Result};

const TOKENS: [&str; 5] = [":app", ":modules", ":config", ":swift", ":lib"];
const DATA_EXTENSIONS: [&str; 2] = ["json", "toml"];

#[derive(Debug, Clone)]
pub struct ResourceResolver {
    paths: PathConfig,
}

impl ResourceResolver {
    pub fn new(paths: PathConfig) -> Self {
        Self { paths }
    }

    /// Resolve a resource path to a filesystem path (extension not probed).
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(Error::validation("resource path must not be empty"));
        }

        if let Some(rest) = path.strip_prefix('[') {
            let (namespace, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::validation(format!("unterminated module namespace in \"{path}\"")))?;
            if namespace.is_empty() || namespace.split('.').any(str::is_empty) {
                return Err(Error::validation(format!("bad module namespace in \"{path}\"")));
            }
            let mut resolved = self.paths.modules.clone();
            for (i, module) in namespace.split('.').enumerate() {
                if i > 0 {
                    resolved.push("modules");
                }
                resolved.push(module);
            }
            return Ok(normalize(&resolved.join(tail.trim_start_matches('/'))));
        }

        for token in TOKENS {
            let Some(rest) = path.strip_prefix(token) else {
                continue;
            };
            if !(rest.is_empty() || rest.starts_with('/')) {
                continue;
            }
            let base = self.token_dir(token);
            return Ok(normalize(&base.join(rest.trim_start_matches('/'))));
        }

        Ok(normalize(&self.paths.project.join(path)))
    }

    fn token_dir(&self, token: &str) -> &Path {
        match token {
            ":app" => &self.paths.app,
            ":modules" => &self.paths.modules,
            ":config" => &self.paths.config,
            ":swift" => &self.paths.swift,
            _ => &self.paths.lib,
        }
    }

    /// Resolve and pick the file to load, probing data extensions.
    fn locate(&self, path: &str) -> Result<PathBuf> {
        let resolved = self.resolve(path)?;
        if resolved.extension().is_some() {
            return Ok(resolved);
        }
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::validation(format!("resource path \"{path}\" has no file name")))?;
        let dir = resolved.parent().unwrap_or_else(|| Path::new("/"));
        let candidates: Vec<String> = DATA_EXTENSIONS
            .iter()
            .map(|ext| format!("{file_name}.{ext}"))
            .collect();
        let names: Vec<&str> = candidates.iter().map(String::as_str).collect();
        Ok(loader::locate(dir, &names)?)
    }

    pub fn load_sync(&self, path: &str) -> Result<Value> {
        let file = self.locate(path)?;
        Ok(loader::load_document(&file)?)
    }

    pub async fn load(&self, path: &str) -> Result<Value> {
        let file = self.locate(path)?;
        Ok(loader::load_document_async(&file).await?)
    }
}

/// Overlay `params` on a loaded document; `params` win.
pub fn overlay(document: Value, params: Map<String, Value>) -> Result<Value> {
    if params.is_empty() {
        return Ok(document);
    }
    match document {
        Value::Object(mut map) => {
            map.extend(params);
            Ok(Value::Object(map))
        }
        other => Err(Error::validation(format!(
            "cannot apply parameters to a {} resource",
            crate::config::configurator::type_name(&other)
        ))),
    }
}
