use std::{fmt, path::Path};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::embedding::EmbeddingBackend;

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_pghost")]
    pub pghost: String,
    #[serde(default = "default_pgport")]
    pub pgport: u16,
    #[serde(default = "default_pguser")]
    pub pguser: String,
    #[serde(default)]
    pub pgpassword: String,
    #[serde(default = "default_pgdatabase")]
    pub pgdatabase: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_shard_dir")]
    pub shard_dir: String,
    #[serde(default = "default_shard_prefix")]
    pub shard_prefix: String,
    #[serde(default = "default_metadata_batch_size")]
    pub metadata_batch_size: usize,
}

fn default_pghost() -> String {
    "localhost".to_string()
}

fn default_pgport() -> u16 {
    5432
}

fn default_pguser() -> String {
    "postgres".to_string()
}

fn default_pgdatabase() -> String {
    "postgres".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_shard_dir() -> String {
    ".".to_string()
}

fn default_shard_prefix() -> String {
    "reviews_chunk_".to_string()
}

fn default_metadata_batch_size() -> usize {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pghost: default_pghost(),
            pgport: default_pgport(),
            pguser: default_pguser(),
            pgpassword: String::new(),
            pgdatabase: default_pgdatabase(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: None,
            embedding_dimension: default_embedding_dimension(),
            openai_api_key: None,
            openai_base_url: default_base_url(),
            shard_dir: default_shard_dir(),
            shard_prefix: default_shard_prefix(),
            metadata_batch_size: default_metadata_batch_size(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("pghost", &self.pghost)
            .field("pgport", &self.pgport)
            .field("pguser", &self.pguser)
            .field("pgpassword", &"<redacted>")
            .field("pgdatabase", &self.pgdatabase)
            .field("embedding_backend", &self.embedding_backend)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimension", &self.embedding_dimension)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("shard_dir", &self.shard_dir)
            .field("shard_prefix", &self.shard_prefix)
            .field("metadata_batch_size", &self.metadata_batch_size)
            .finish()
    }
}

impl AppConfig {
    /// Connection settings for `tokio-postgres`.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.pghost)
            .port(self.pgport)
            .user(&self.pguser)
            .dbname(&self.pgdatabase)
            .application_name("review-loader");
        if !self.pgpassword.is_empty() {
            pg.password(&self.pgpassword);
        }
        pg
    }

    /// Renders the configuration as environment variables, the form in which
    /// it is handed to worker processes. Reading these back through
    /// [`get_config`] yields an identical configuration.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("PGHOST", self.pghost.clone()),
            ("PGPORT", self.pgport.to_string()),
            ("PGUSER", self.pguser.clone()),
            ("PGPASSWORD", self.pgpassword.clone()),
            ("PGDATABASE", self.pgdatabase.clone()),
            ("EMBEDDING_BACKEND", self.embedding_backend.to_string()),
            ("EMBEDDING_DIMENSION", self.embedding_dimension.to_string()),
            ("OPENAI_BASE_URL", self.openai_base_url.clone()),
            ("SHARD_DIR", self.shard_dir.clone()),
            ("SHARD_PREFIX", self.shard_prefix.clone()),
            ("METADATA_BATCH_SIZE", self.metadata_batch_size.to_string()),
        ];
        if let Some(model) = &self.embedding_model {
            vars.push(("EMBEDDING_MODEL", model.clone()));
        }
        if let Some(key) = &self.openai_api_key {
            vars.push(("OPENAI_API_KEY", key.clone()));
        }
        vars
    }
}

/// Loads configuration from an optional file, overlaid by the process
/// environment. A missing default file is tolerated; an explicitly named file
/// must exist.
pub fn get_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config").required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_libpq_conventions() {
        let config = AppConfig::default();
        assert_eq!(config.pghost, "localhost");
        assert_eq!(config.pgport, 5432);
        assert_eq!(config.pguser, "postgres");
        assert_eq!(config.pgdatabase, "postgres");
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.metadata_batch_size, 500);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AppConfig {
            pgpassword: "hunter2".into(),
            openai_api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn env_rendering_covers_connection_settings() {
        let config = AppConfig {
            pghost: "db.internal".into(),
            pgport: 6543,
            pgpassword: "pw".into(),
            ..Default::default()
        };
        let env = config.to_env();
        let lookup = |key: &str| {
            env.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
        };
        assert_eq!(lookup("PGHOST").as_deref(), Some("db.internal"));
        assert_eq!(lookup("PGPORT").as_deref(), Some("6543"));
        assert_eq!(lookup("PGPASSWORD").as_deref(), Some("pw"));
        assert_eq!(lookup("EMBEDDING_BACKEND").as_deref(), Some("fastembed"));
        assert!(lookup("OPENAI_API_KEY").is_none());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config file");
        writeln!(
            file,
            "shard_prefix = \"reviews_test_\"\nembedding_dimension = 384\nembedding_backend = \"hashed\""
        )
        .expect("write config");

        let config = get_config(Some(file.path())).expect("config loads");
        assert_eq!(config.shard_prefix, "reviews_test_");
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashed);
    }

    #[test]
    fn embedding_backend_aliases_load_and_unknown_names_fail() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config file");
        writeln!(file, "embedding_backend = \"Fast-Embed\"").expect("write config");
        let config = get_config(Some(file.path())).expect("config loads");
        assert_eq!(config.embedding_backend, EmbeddingBackend::FastEmbed);

        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config file");
        writeln!(file, "embedding_backend = \"word2vec\"").expect("write config");
        let err = get_config(Some(file.path())).expect_err("unknown backend");
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let result = get_config(Some(Path::new("/nonexistent/loader-config.toml")));
        assert!(result.is_err());
    }
}
