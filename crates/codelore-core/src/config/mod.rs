mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be greater than 0");
        }
        if self.ingest.relation_group_size == 0 {
            bail!("ingest.relation_group_size must be greater than 0");
        }
        if self.embedding.concurrency == 0 {
            bail!("embedding.concurrency must be greater than 0");
        }
        if self.graph.dimensions == 0 {
            bail!("graph.dimensions must be greater than 0");
        }
        for (name, value) in [
            ("retrieval.code_threshold", self.retrieval.code_threshold),
            ("retrieval.similar_threshold", self.retrieval.similar_threshold),
            ("retrieval.doc_threshold", self.retrieval.doc_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }
        Ok(())
    }
}
