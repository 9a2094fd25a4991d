//! Settings loading and validation.
//!
//! Settings come from a single YAML file. Validation happens at load time:
//! queue names must be well formed, the dependency declarations must be
//! acyclic (checked by building the graph), static queues require
//! stop-when-done, and every seed queue must carry at least one
//! configuration.

mod error;
mod types;

pub use error::ConfigError;
pub use types::{ApiSettings, DependencyPair, SeedQueue, Settings};

use std::path::Path;

use crate::core::deps::DependencyGraph;
use crate::core::service::ServiceConfig;
use crate::core::types::QueueName;

/// Load settings from a YAML file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::YamlFileError {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse settings from YAML text.
pub fn parse_settings(text: &str) -> Result<Settings, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
}

impl Settings {
    /// Validate the settings and build the dependency graph.
    pub fn validate(&self) -> Result<DependencyGraph, ConfigError> {
        if self.queues_static && !self.stop_when_done {
            return Err(ConfigError::InvalidConfig(
                "queues_static requires stop_when_done".to_string(),
            ));
        }

        let graph = DependencyGraph::new(
            self.queue_dependencies
                .iter()
                .map(|pair| (pair.queue.clone(), pair.depends_on.clone())),
        )?;

        for seed in &self.queues {
            QueueName::parse(&seed.queue)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
            if seed.services.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "seed queue '{}' carries no configurations",
                    seed.queue
                )));
            }
        }

        Ok(graph)
    }

    /// The seed pairs in scheduler form.
    pub fn seed_queues(&self) -> Vec<(QueueName, Vec<ServiceConfig>)> {
        self.queues
            .iter()
            .map(|seed| (QueueName::new(seed.queue.clone()), seed.services.clone()))
            .collect()
    }
}
