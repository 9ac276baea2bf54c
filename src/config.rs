//! Engine configuration

use std::path::{Path, PathBuf};

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default schema name
pub const DEFAULT_SCHEMA: &str = "default";

/// Both join inputs must be larger than this for a sort-merge join
pub const DEFAULT_SORT_MERGE_THRESHOLD: usize = 100;

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Root directory of persisted schemas
    pub data_dir: PathBuf,
    /// Schema name; the schema lives in `data_dir/schema`
    pub schema: String,
    /// Save the catalog after every successful mutating statement
    pub persist: bool,
    /// Row-count threshold for choosing a sort-merge join
    pub sort_merge_threshold: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            schema: DEFAULT_SCHEMA.to_string(),
            persist: true,
            sort_merge_threshold: DEFAULT_SORT_MERGE_THRESHOLD,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration of an engine that never touches disk
    pub fn in_memory() -> Self {
        Self::default().persist(false)
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the schema name
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn sort_merge_threshold(mut self, threshold: usize) -> Self {
        self.sort_merge_threshold = threshold;
        self
    }

    /// Directory holding the configured schema
    pub fn schema_dir(&self) -> PathBuf {
        self.data_dir.join(&self.schema)
    }
}
