//! JSON data source.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{DataError, Result};
use crate::sources::DataSource;

/// JSON file data source
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    /// Create a new JSON source from a file path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::FileNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Parse JSON text
    pub fn parse(text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }
}

impl DataSource for JsonSource {
    fn load(&self) -> Result<Value> {
        let text = fs::read_to_string(&self.path)?;
        Self::parse(&text)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
