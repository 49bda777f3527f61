//! Durable key-value persistence for the conversation store
//!
//! Two slots in an embedded `sled` database: one holding the full
//! serialized conversation list, one holding the currently-selected
//! conversation identifier. The in-memory store remains authoritative;
//! callers treat every write here as best-effort.

use crate::error::{ChatRelayError, Result};
use crate::store::model::Conversation;
use sled::Db;
use std::path::Path;

const CONVERSATIONS_KEY: &[u8] = b"conversations";
const CURRENT_KEY: &[u8] = b"current";

/// sled-backed state storage for the conversation store
pub struct StateStore {
    db: Db,
}

impl StateStore {
    /// Open or create the state database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Storage` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ChatRelayError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Load the persisted conversation list
    ///
    /// # Returns
    ///
    /// `None` when the slot has never been written.
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Storage` if the read or deserialization
    /// fails.
    pub fn load_conversations(&self) -> Result<Option<Vec<Conversation>>> {
        match self
            .db
            .get(CONVERSATIONS_KEY)
            .map_err(|e| ChatRelayError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let conversations = serde_json::from_slice(&bytes).map_err(|e| {
                    ChatRelayError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(conversations))
            }
            None => Ok(None),
        }
    }

    /// Persist the full conversation list
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Storage` if serialization, insertion, or
    /// flush fails. The caller is expected to log and swallow.
    pub fn save_conversations(&self, conversations: &[Conversation]) -> Result<()> {
        let value = serde_json::to_vec(conversations)
            .map_err(|e| ChatRelayError::Storage(format!("Serialization failed: {}", e)))?;
        self.db
            .insert(CONVERSATIONS_KEY, value)
            .map_err(|e| ChatRelayError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| ChatRelayError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Load the persisted current conversation id
    pub fn load_current(&self) -> Result<Option<String>> {
        match self
            .db
            .get(CURRENT_KEY)
            .map_err(|e| ChatRelayError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            None => Ok(None),
        }
    }

    /// Persist the current conversation id (or clear the slot)
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Storage` on write failure. The caller is
    /// expected to log and swallow.
    pub fn save_current(&self, current: Option<&str>) -> Result<()> {
        match current {
            Some(id) => {
                self.db
                    .insert(CURRENT_KEY, id.as_bytes())
                    .map_err(|e| ChatRelayError::Storage(format!("Insert failed: {}", e)))?;
            }
            None => {
                self.db
                    .remove(CURRENT_KEY)
                    .map_err(|e| ChatRelayError::Storage(format!("Remove failed: {}", e)))?;
            }
        }
        self.db
            .flush()
            .map_err(|e| ChatRelayError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}
