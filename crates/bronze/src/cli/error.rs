//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    pub fn config_not_found(path: &Path) -> Self {
        Self::new(format!("Config file not found: {}", path.display()))
            .with_context("bronze run reads its store and sources from a TOML file")
            .with_suggestions([
                format!("TRY: Pass the file explicitly: bronze run --config {}", path.display()),
                "TRY: Create bronze.toml with a [store] section and one [[sources]] entry per source"
                    .to_string(),
            ])
    }

    pub fn invalid_config(path: &Path, details: &str) -> Self {
        Self::new(format!("Invalid config: {}", path.display()))
            .with_context(details.to_string())
            .with_suggestions([
                "TRY: Check that every [[sources]] entry has id, kind and location".to_string(),
                "TRY: kind must be \"database\" or \"file\"".to_string(),
                "TRY: Export every ${VAR} referenced in the file".to_string(),
            ])
    }

    pub fn store_not_found(path: &Path) -> Self {
        Self::new(format!("Landing store not found: {}", path.display()))
            .with_context("The landing store is created by the first successful run")
            .with_suggestions([
                "TRY: Load data first: bronze run --config bronze.toml".to_string(),
                "TRY: Point at an existing store: --store <path> or BRONZE_STORE".to_string(),
            ])
    }

    pub fn store_locked(path: &Path) -> Self {
        Self::new(format!("Landing store is locked: {}", path.display()))
            .with_context("Another bronze run is writing to this store")
            .with_suggestions([
                "TRY: Wait for the other run to finish".to_string(),
                format!(
                    "TRY: Inspect the lock holder: cat {}.lock.json",
                    path.display()
                ),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Machine-readable error for `--json` callers.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "status": "error",
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "status": "error",
            "error": format!("{:#}", err),
        }),
    };
    println!("{}", payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While loading sources")
            .with_suggestion("TRY: again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While loading sources"));
        assert!(display.contains("TRY: again"));
    }

    #[test]
    fn test_store_locked_points_at_sidecar() {
        let err = HelpfulError::store_locked(&PathBuf::from("/data/bronze.duckdb"));
        let display = format!("{}", err);
        assert!(display.contains("/data/bronze.duckdb.lock.json"));
        assert!(display.contains("TRY:"));
    }
}
