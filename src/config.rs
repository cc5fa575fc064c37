use crate::errors::IndexerError;
use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::Path};
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Elasticsearch endpoint.
    pub url: Url,
    pub enabled_indexes: Vec<String>,
    #[serde(default)]
    pub denomination: i32,
    #[serde(default = "defaults::bulk_request_max_size")]
    pub bulk_request_max_size: usize,
    #[serde(default)]
    pub is_in_import_db_mode: bool,
    #[serde(default)]
    pub use_kibana: bool,
    pub self_shard_id: u32,
    pub num_shards: u32,
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,
}

impl Config {
    /// Reads and validates a configuration from the specified path.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.enabled_indexes.is_empty() {
            return Err(IndexerError::EmptyEnabledIndexes);
        }
        if self.denomination < 0 {
            return Err(IndexerError::NegativeDenomination(self.denomination));
        }
        if self.num_shards == 0 {
            return Err(IndexerError::Config("num-shards must be positive".into()));
        }
        Ok(())
    }
}

mod defaults {
    pub fn bulk_request_max_size() -> usize {
        crate::data::DEFAULT_MAX_BULK_SIZE
    }

    pub fn queue_capacity() -> usize {
        1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn parses_with_defaults() {
        let config = parse(
            r#"
            url = "http://localhost:9200"
            enabled-indexes = ["blocks", "transactions"]
            self-shard-id = 0
            num-shards = 3
            "#,
        );

        assert_eq!(config.url.as_str(), "http://localhost:9200/");
        assert_eq!(config.bulk_request_max_size, 4 * 1024 * 1024);
        assert_eq!(config.queue_capacity, 1000);
        assert!(!config.is_in_import_db_mode);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_enabled_indexes() {
        let config = parse(
            r#"
            url = "http://localhost:9200"
            enabled-indexes = []
            self-shard-id = 0
            num-shards = 1
            "#,
        );

        assert!(matches!(
            config.validate(),
            Err(IndexerError::EmptyEnabledIndexes)
        ));
    }

    #[test]
    fn rejects_negative_denomination() {
        let config = parse(
            r#"
            url = "http://localhost:9200"
            enabled-indexes = ["blocks"]
            denomination = -3
            self-shard-id = 0
            num-shards = 1
            "#,
        );

        assert!(matches!(
            config.validate(),
            Err(IndexerError::NegativeDenomination(-3))
        ));
    }
}
