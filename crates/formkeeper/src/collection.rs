//! The collection of saved records.
//!
//! Records are kept newest-first: a save with an unseen id is prepended, and a
//! save with a known id replaces that entry where it stands. The collection
//! serializes as a plain JSON array of records, which is also the backup file
//! format.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{Record, RecordId};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The record was new and was prepended.
    Inserted,
    /// An entry with the same id was replaced in place.
    Replaced,
}

/// All saved records, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id.as_ref() == Some(id))
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id.as_ref() == Some(id))
    }

    /// Insert or replace a saved record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no id (it was never stamped for
    /// saving).
    pub fn upsert(&mut self, record: Record) -> Result<Upsert> {
        let Some(id) = record.id.clone() else {
            return Err(Error::internal("cannot store a record without an id"));
        };

        if let Some(index) = self.position(&id) {
            debug!(%id, index, "replacing record");
            self.records[index] = record;
            Ok(Upsert::Replaced)
        } else {
            debug!(%id, "inserting record");
            self.records.insert(0, record);
            Ok(Upsert::Inserted)
        }
    }

    /// Remove the record with the given id.
    ///
    /// Returns the removed record, or `None` if no record had that id.
    pub fn remove(&mut self, id: &RecordId) -> Option<Record> {
        self.position(id).map(|index| self.records.remove(index))
    }

    /// Build a collection from an untyped backup document.
    ///
    /// The document must be a sequence of records, each with an id, and no
    /// id may appear twice. Nothing is partially accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBackup`] if the document is rejected.
    pub fn from_backup(raw: &serde_json::Value) -> Result<Self> {
        let Some(entries) = raw.as_array() else {
            return Err(Error::invalid_backup("expected a sequence of records"));
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let record = Record::deserialize(entry)
                .map_err(|e| Error::invalid_backup(format!("entry {index}: {e}")))?;

            let Some(id) = record.id.clone() else {
                return Err(Error::invalid_backup(format!("entry {index} has no id")));
            };
            if !seen.insert(id.clone()) {
                return Err(Error::invalid_backup(format!("duplicate record id '{id}'")));
            }
            records.push(record);
        }

        Ok(Self { records })
    }

    /// Parse a backup file's text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBackup`] if the text is not JSON or the
    /// document is rejected by [`Collection::from_backup`].
    pub fn from_backup_str(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::invalid_backup(format!("not valid JSON: {e}")))?;
        Self::from_backup(&raw)
    }

    /// Serialize as a pretty-printed backup document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_backup_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
