// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory job catalog: name → definition + live instance.
//!
//! The catalog exclusively owns definitions; each definition exclusively
//! owns its instance. Iteration order is the job name order, so list
//! replies are deterministic.

use crate::job::{Job, JobDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Rejected job names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("job name is empty")]
    Empty,
    #[error("job name contains whitespace or control characters: {0:?}")]
    Unprintable(String),
}

fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(NameError::Unprintable(name.to_string()));
    }
    Ok(())
}

/// One catalog slot: the definition plus its lazily created instance.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub def: Arc<JobDefinition>,
    pub instance: Option<Job>,
}

/// The catalog itself. Mutated only by the dispatcher.
#[derive(Debug, Default)]
pub struct JobCatalog {
    jobs: BTreeMap<String, CatalogEntry>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one with the same name.
    ///
    /// A live instance survives a replace: the new definition applies from
    /// the next machine step onwards.
    pub fn insert(&mut self, def: JobDefinition) -> Result<(), NameError> {
        validate_name(&def.name)?;
        let name = def.name.clone();
        let def = Arc::new(def);
        match self.jobs.get_mut(&name) {
            Some(entry) => entry.def = def,
            None => {
                self.jobs.insert(name, CatalogEntry { def, instance: None });
            }
        }
        Ok(())
    }

    /// Drop a definition. Returns the detached entry so the dispatcher can
    /// run the instance through its deletion drain.
    pub fn remove(&mut self, name: &str) -> Option<CatalogEntry> {
        self.jobs.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.jobs.get(name)
    }

    /// The definition for a job, if registered.
    pub fn definition(&self, name: &str) -> Option<Arc<JobDefinition>> {
        self.jobs.get(name).map(|e| Arc::clone(&e.def))
    }

    /// The live instance, creating it on first use.
    pub fn instance_mut(&mut self, name: &str) -> Option<&mut Job> {
        let entry = self.jobs.get_mut(name)?;
        Some(entry.instance.get_or_insert_with(|| Job::new(name)))
    }

    /// The live instance, without creating one.
    pub fn existing_instance_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.get_mut(name)?.instance.as_mut()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.jobs.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
