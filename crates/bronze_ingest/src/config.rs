//! `bronze.toml` loading.
//!
//! ```toml
//! [store]
//! path = "data/bronze.duckdb"
//! namespace = "bronze"
//!
//! [run]
//! concurrency = 4
//!
//! [[sources]]
//! id = "customers"
//! kind = "database"
//! location = "${SOURCE_DATABASE_URL}"
//! table = "public.customers"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::IngestError;
use crate::orchestrator::{DEFAULT_CONCURRENCY, DEFAULT_NAMESPACE};
use crate::source::{SourceDescriptor, SourceKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable {var} referenced by {field} is not set")]
    MissingEnvVar { var: String, field: String },

    #[error("Unterminated ${{...}} reference in {field}")]
    UnterminatedReference { field: String },

    #[error("Source '{source_id}': delimiter must be a single ASCII character, got {value:?}")]
    InvalidDelimiter { source_id: String, value: String },
}

impl From<ConfigError> for IngestError {
    fn from(err: ConfigError) -> Self {
        IngestError::OrchestratorInit(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BronzeConfig {
    pub store: StoreSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    pub id: String,
    pub kind: SourceKind,
    pub location: String,
    pub table: Option<String>,
    pub delimiter: Option<String>,
    pub timestamp_hints: Option<Vec<String>>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Configuration with environment references expanded and paths resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_path: PathBuf,
    pub namespace: String,
    pub concurrency: usize,
    pub sources: Vec<SourceDescriptor>,
}

impl BronzeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Parse a config file without resolving it.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Read and resolve a config file; relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<ResolvedConfig, ConfigError> {
        Self::read(path)?.resolve(config_dir(path))
    }

    /// Landing store path only; source locations are left unexpanded.
    pub fn store_location(&self, base_dir: &Path) -> Result<PathBuf, ConfigError> {
        Ok(resolve_path(
            base_dir,
            &expand_env(&self.store.path, "store.path")?,
        ))
    }

    pub fn resolve(self, base_dir: &Path) -> Result<ResolvedConfig, ConfigError> {
        let store_path = self.store_location(base_dir)?;

        let mut sources = Vec::with_capacity(self.sources.len());
        for entry in self.sources {
            let field = format!("sources.{}.location", entry.id);
            let location = expand_env(&entry.location, &field)?;
            let mut descriptor = match entry.kind {
                SourceKind::Database => SourceDescriptor::database(&entry.id, location),
                SourceKind::File => SourceDescriptor::file(
                    &entry.id,
                    resolve_path(base_dir, &location).display().to_string(),
                ),
            };
            if let Some(table) = entry.table {
                descriptor = descriptor.with_table(table);
            }
            if let Some(delimiter) = entry.delimiter {
                descriptor = descriptor.with_delimiter(parse_delimiter(&entry.id, &delimiter)?);
            }
            if let Some(hints) = entry.timestamp_hints {
                descriptor = descriptor.with_timestamp_hints(hints);
            }
            sources.push(descriptor);
        }

        Ok(ResolvedConfig {
            store_path,
            namespace: self.store.namespace,
            concurrency: self.run.concurrency,
            sources,
        })
    }
}

/// Directory relative config paths resolve against.
pub fn config_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn parse_delimiter(source_id: &str, raw: &str) -> Result<u8, ConfigError> {
    let value = if raw == "\\t" { "\t" } else { raw };
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(ConfigError::InvalidDelimiter {
            source_id: source_id.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Replace `${VAR}` references with environment values.
pub fn expand_env(raw: &str, field: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedReference {
                field: field.to_string(),
            })?;
        let var = &after[..end];
        let value = std::env::var(var).map_err(|_| ConfigError::MissingEnvVar {
            var: var.to_string(),
            field: field.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
