//! Durable cursor, grounded on `gocdk/local_file_cursor.go`'s
//! `LocalFileCursor`: a flat string-keyed map persisted to a local file.
//! Serialization is `bincode` instead of `encoding/gob`, the Rust-idiomatic
//! analog for a small self-describing local binary blob.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CursorState {
    values: HashMap<String, CursorValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CursorValue {
    Str(String),
    Int(i64),
    Bool(bool),
    ShardList(Vec<ShardInfo>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardInfo {
    pub shard_id: String,
    pub starting_sequence_number: String,
    pub max_sequence_present: bool,
    pub ending_sequence_number: String,
}

/// A cursor bound to `<name>.cursor` in the working directory, mirroring
/// `NewLocalFileCursor`'s `<name>.gob` naming (`name` is already
/// `<source-name>_<service>` by convention).
pub struct LocalFileCursor {
    path: PathBuf,
    state: CursorState,
}

impl LocalFileCursor {
    pub fn new(name: &str) -> Self {
        Self {
            path: PathBuf::from(format!("{name}.cursor")),
            state: CursorState::default(),
        }
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.path).exists()
    }

    pub fn set(&mut self, key: impl Into<String>, value: CursorValue) {
        self.state.values.insert(key.into(), value);
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.state.values.get(key) {
            Some(CursorValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn get_shard_list(&self, key: &str) -> Option<Vec<ShardInfo>> {
        match self.state.values.get(key) {
            Some(CursorValue::ShardList(list)) => Some(list.clone()),
            _ => None,
        }
    }

    pub fn serialize(&self) -> anyhow::Result<()> {
        let bytes = bincode::serialize(&self.state)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    pub fn deserialize(&mut self) -> anyhow::Result<()> {
        let bytes = std::fs::read(&self.path)?;
        self.state = bincode::deserialize(&bytes)?;
        Ok(())
    }
}
