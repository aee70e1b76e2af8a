// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definition loading.
//!
//! One TOML file per job in the jobs directory; the file stem is the job
//! name. Loaded once at startup, and re-read per job on an explicit
//! reload request.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vigil_core::{ActionSpec, ConsoleType, JobDefinition, ProcessKind, RespawnPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid job file {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// On-disk shape of one job file.
#[derive(Debug, Default, Deserialize)]
struct JobFile {
    #[serde(default)]
    description: String,
    /// Main action, command-line form.
    exec: Option<String>,
    /// Main action, argv form.
    args: Option<Vec<String>>,
    console: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    respawn: Option<RespawnField>,
    #[serde(default, rename = "wait-for-stop")]
    wait_for_stop: bool,
    #[serde(default, rename = "start-on")]
    start_on: Vec<String>,
    #[serde(default, rename = "stop-on")]
    stop_on: Vec<String>,
    #[serde(rename = "kill-timeout-secs")]
    kill_timeout_secs: Option<u64>,
    #[serde(rename = "pre-start")]
    pre_start: Option<ScriptFile>,
    #[serde(rename = "post-start")]
    post_start: Option<ScriptFile>,
    #[serde(rename = "pre-stop")]
    pre_stop: Option<ScriptFile>,
    #[serde(rename = "post-stop")]
    post_stop: Option<ScriptFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RespawnField {
    Enabled(bool),
    Policy {
        limit: Option<u32>,
        #[serde(rename = "window-secs")]
        window_secs: Option<u64>,
    },
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    exec: Option<String>,
    args: Option<Vec<String>>,
}

fn action_spec(
    exec: Option<String>,
    args: Option<Vec<String>>,
    kind: ProcessKind,
    path: &Path,
) -> Result<Option<ActionSpec>, ConfigError> {
    match (exec, args) {
        (None, None) => Ok(None),
        (Some(line), None) => Ok(Some(ActionSpec::Command(line))),
        (None, Some(argv)) => {
            if argv.is_empty() {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    reason: format!("{kind}: args is empty"),
                });
            }
            Ok(Some(ActionSpec::Args(argv)))
        }
        (Some(_), Some(_)) => Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: format!("{kind}: exec and args are mutually exclusive"),
        }),
    }
}

impl JobFile {
    fn into_definition(self, name: &str, path: &Path) -> Result<JobDefinition, ConfigError> {
        let mut def = JobDefinition::new(name, self.description);

        if let Some(spec) = action_spec(self.exec, self.args, ProcessKind::Main, path)? {
            def.actions.insert(ProcessKind::Main, spec);
        }
        let scripts = [
            (ProcessKind::PreStart, self.pre_start),
            (ProcessKind::PostStart, self.post_start),
            (ProcessKind::PreStop, self.pre_stop),
            (ProcessKind::PostStop, self.post_stop),
        ];
        for (kind, script) in scripts {
            if let Some(script) = script {
                if let Some(spec) = action_spec(script.exec, script.args, kind, path)? {
                    def.actions.insert(kind, spec);
                }
            }
        }

        if let Some(name) = self.console {
            def.console = ConsoleType::from_name(&name).ok_or_else(|| ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!("unknown console type {name:?}"),
            })?;
        }

        def.env = self.env.into_iter().collect();
        def.respawn = match self.respawn {
            None | Some(RespawnField::Enabled(false)) => None,
            Some(RespawnField::Enabled(true)) => Some(RespawnPolicy::default()),
            Some(RespawnField::Policy { limit, window_secs }) => {
                let defaults = RespawnPolicy::default();
                Some(RespawnPolicy {
                    limit: limit.unwrap_or(defaults.limit),
                    window: window_secs.map(Duration::from_secs).unwrap_or(defaults.window),
                })
            }
        };
        def.wait_for_stop = self.wait_for_stop;
        def.start_on = self.start_on;
        def.stop_on = self.stop_on;
        if let Some(secs) = self.kill_timeout_secs {
            def.kill_timeout = Duration::from_secs(secs);
        }

        Ok(def)
    }
}

/// Load one job definition by name. `Ok(None)` when the file is absent
/// (the job was unconfigured).
pub fn load_job(dir: &Path, name: &str) -> Result<Option<JobDefinition>, ConfigError> {
    let path = dir.join(format!("{name}.toml"));
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let file: JobFile = toml::from_str(&text)
        .map_err(|source| ConfigError::Parse { path: path.clone(), source: Box::new(source) })?;
    file.into_definition(name, &path).map(Some)
}

/// Load every `*.toml` job file in the directory, in name order.
/// A missing directory is an empty catalog, not an error.
pub fn load_dir(dir: &Path) -> Result<Vec<JobDefinition>, ConfigError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(ConfigError::Io { path: dir.to_path_buf(), source }),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();

    let mut defs = Vec::with_capacity(names.len());
    for name in names {
        if let Some(def) = load_job(dir, &name)? {
            defs.push(def);
        }
    }
    Ok(defs)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
