use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CiteGraphError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: Option<String>,
    pub neo4j_user: Option<String>,
    pub neo4j_password: Option<String>,

    // OpenAlex
    pub openalex_mailto: Option<String>,
    pub openalex_base_url: String,
    pub openalex_min_interval: Duration,

    // Local files
    pub data_dir: PathBuf,
    pub crawl_state_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, CiteGraphError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CiteGraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let data_dir = PathBuf::from(lookup("CITEGRAPH_DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let crawl_state_path = lookup("CITEGRAPH_CRAWL_STATE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("crawl_state.json"));

        let interval_ms = match lookup("OPENALEX_MIN_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                CiteGraphError::Config(format!("OPENALEX_MIN_INTERVAL_MS must be a number, got {raw:?}"))
            })?,
            None => 100,
        };

        Ok(Self {
            neo4j_uri: optional("NEO4J_URI"),
            neo4j_user: optional("NEO4J_USER"),
            neo4j_password: optional("NEO4J_PASSWORD"),
            openalex_mailto: optional("OPENALEX_MAILTO").or_else(|| optional("VITE_OPENALEX_MAILTO")),
            openalex_base_url: lookup("OPENALEX_BASE_URL")
                .unwrap_or_else(|| "https://api.openalex.org".to_string()),
            openalex_min_interval: Duration::from_millis(interval_ms),
            data_dir,
            crawl_state_path,
        })
    }

    /// The upstream contact address. Only commands that call OpenAlex need it.
    pub fn require_mailto(&self) -> Result<&str, CiteGraphError> {
        self.openalex_mailto
            .as_deref()
            .ok_or_else(|| CiteGraphError::Config("OPENALEX_MAILTO environment variable is required".into()))
    }

    /// Neo4j connection settings as `(uri, user, password)`. Only commands
    /// that touch the graph need them.
    pub fn require_neo4j(&self) -> Result<(&str, &str, &str), CiteGraphError> {
        fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, CiteGraphError> {
            value
                .as_deref()
                .ok_or_else(|| CiteGraphError::Config(format!("{key} environment variable is required")))
        }
        Ok((
            required(&self.neo4j_uri, "NEO4J_URI")?,
            required(&self.neo4j_user, "NEO4J_USER")?,
            required(&self.neo4j_password, "NEO4J_PASSWORD")?,
        ))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.data_dir.join("papers.jsonl")
    }

    pub fn failed_path(&self) -> PathBuf {
        self.data_dir.join("failed_papers.jsonl")
    }

    /// Log the loaded configuration without exposing secrets.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(3).collect();
            format!("{head}...({} chars)", val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  NEO4J_URI: {}", self.neo4j_uri.as_deref().unwrap_or("<not set>"));
        tracing::info!("  NEO4J_USER: {}", self.neo4j_user.as_deref().unwrap_or("<not set>"));
        tracing::info!(
            "  NEO4J_PASSWORD: {}",
            self.neo4j_password.as_deref().map_or("<not set>".to_string(), preview)
        );
        tracing::info!(
            "  OPENALEX_MAILTO: {}",
            self.openalex_mailto.as_deref().unwrap_or("<not set>")
        );
        tracing::info!("  OPENALEX_BASE_URL: {}", self.openalex_base_url);
        tracing::info!("  CITEGRAPH_DATA_DIR: {}", self.data_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const NEO4J: [(&str, &str); 3] = [
        ("NEO4J_URI", "bolt://localhost:7687"),
        ("NEO4J_USER", "neo4j"),
        ("NEO4J_PASSWORD", "secret"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(&NEO4J)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.crawl_state_path, PathBuf::from("./data/crawl_state.json"));
        assert_eq!(config.openalex_min_interval, Duration::from_millis(100));
        assert_eq!(config.staging_path(), PathBuf::from("./data/papers.jsonl"));
        assert!(config.openalex_mailto.is_none());
    }

    #[test]
    fn missing_neo4j_uri_is_a_config_error_only_when_required() {
        let config = Config::from_lookup(lookup(&NEO4J[1..])).unwrap();
        let err = config.require_neo4j().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("NEO4J_URI"));
    }

    #[test]
    fn crawl_only_environment_loads_without_neo4j() {
        let config = Config::from_lookup(lookup(&[("OPENALEX_MAILTO", "ops@example.org")])).unwrap();
        assert_eq!(config.require_mailto().unwrap(), "ops@example.org");
        assert!(config.require_neo4j().is_err());
    }

    #[test]
    fn neo4j_settings_come_back_together() {
        let config = Config::from_lookup(lookup(&NEO4J)).unwrap();
        assert_eq!(
            config.require_neo4j().unwrap(),
            ("bolt://localhost:7687", "neo4j", "secret")
        );
    }

    #[test]
    fn mailto_falls_back_to_vite_prefixed_key() {
        let mut pairs = NEO4J.to_vec();
        pairs.push(("VITE_OPENALEX_MAILTO", "ops@example.org"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.require_mailto().unwrap(), "ops@example.org");
    }

    #[test]
    fn missing_mailto_is_a_config_error_only_when_required() {
        let config = Config::from_lookup(lookup(&NEO4J)).unwrap();
        assert!(config.require_mailto().unwrap_err().is_config());
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let mut pairs = NEO4J.to_vec();
        pairs.push(("OPENALEX_MIN_INTERVAL_MS", "fast"));
        assert!(Config::from_lookup(lookup(&pairs)).unwrap_err().is_config());
    }
}
