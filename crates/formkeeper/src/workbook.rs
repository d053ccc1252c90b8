//! The workbook: active schema, saved records and the store behind them.
//!
//! A [`Workbook`] is the single owner of application state. Every mutating
//! operation builds the new state first, persists it, and only then swaps it
//! in, so a rejected document or a failed write leaves the workbook as it was.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::collection::{Collection, Upsert};
use crate::engine::compute_record;
use crate::error::{Error, Result};
use crate::record::{Record, RecordId, Value};
use crate::schema::{load_schema, Schema};
use crate::storage::{KeyValueStore, CUSTOMERS_KEY, SCHEMA_KEY};

/// Application state backed by a [`KeyValueStore`].
#[derive(Debug)]
pub struct Workbook<S> {
    store: S,
    schema: Schema,
    records: Collection,
}

impl<S: KeyValueStore> Workbook<S> {
    /// Load state from `store`.
    ///
    /// Uses `fallback` when no schema is stored, or when the stored one no
    /// longer validates. A missing collection starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, or [`Error::InvalidBackup`] if the
    /// stored collection is unreadable.
    pub async fn open(store: S, fallback: Schema) -> Result<Self> {
        let schema = stored_schema(&store, fallback).await?;
        let records = match store.get(CUSTOMERS_KEY).await? {
            Some(raw) => Collection::from_backup(&raw)?,
            None => Collection::new(),
        };
        Ok(Self::assemble(store, schema, records))
    }

    /// Load state for restoring a backup.
    ///
    /// Like [`Workbook::open`], except that an unreadable stored collection
    /// is set aside: the workbook starts with no records and the rejection is
    /// returned alongside it. Nothing is written until the next import or
    /// save.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn open_for_restore(store: S, fallback: Schema) -> Result<(Self, Option<Error>)> {
        let schema = stored_schema(&store, fallback).await?;
        let (records, rejected) = match store.get(CUSTOMERS_KEY).await? {
            Some(raw) => match Collection::from_backup(&raw) {
                Ok(records) => (records, None),
                Err(e) => {
                    warn!("Stored records are unreadable, starting empty: {}", e);
                    (Collection::new(), Some(e))
                }
            },
            None => (Collection::new(), None),
        };
        Ok((Self::assemble(store, schema, records), rejected))
    }

    fn assemble(store: S, schema: Schema, records: Collection) -> Self {
        debug!(
            records = records.len(),
            schema = %schema.title,
            "workbook opened"
        );
        Self {
            store,
            schema,
            records,
        }
    }

    /// The active schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The saved records, newest first.
    #[must_use]
    pub fn records(&self) -> &Collection {
        &self.records
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A blank, computed draft for a new record.
    #[must_use]
    pub fn new_draft(&self) -> Record {
        self.compute(&Record::blank(&self.schema))
    }

    /// A draft for editing the saved record `id`.
    ///
    /// Fields the schema declares but the record lacks are added as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if no record has that id.
    pub fn draft_for(&self, id: &RecordId) -> Result<Record> {
        let mut draft = self
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::record_not_found(id.as_str()))?;

        for field in self.schema.fields() {
            draft.values.entry(field.id.clone()).or_default();
        }
        Ok(self.compute(&draft))
    }

    /// Recompute the calculated fields of a draft.
    #[must_use]
    pub fn compute(&self, draft: &Record) -> Record {
        compute_record(&self.schema, draft)
    }

    /// Assign user input to an input field of a draft.
    ///
    /// The text is converted according to the field's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the schema has no such field, or
    /// [`Error::CalculatedField`] if the field is calculated.
    pub fn apply_input(&self, draft: &mut Record, field_id: &str, input: &str) -> Result<()> {
        let field = self.schema.field(field_id).ok_or_else(|| Error::UnknownField {
            id: field_id.to_string(),
        })?;
        if field.is_calculated() {
            return Err(Error::CalculatedField {
                id: field_id.to_string(),
            });
        }

        draft.set(field_id, Value::from_input(input, &field.kind));
        Ok(())
    }

    /// Compute, stamp and store a draft.
    ///
    /// Returns the record as saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be persisted; the workbook
    /// is unchanged in that case.
    pub async fn save(&mut self, draft: Record) -> Result<Record> {
        let mut record = self.compute(&draft);
        record.stamp_for_save(Utc::now());

        let mut records = self.records.clone();
        let outcome = records.upsert(record.clone())?;
        self.persist_records(&records).await?;
        self.records = records;

        let id = record.id.as_ref().map(ToString::to_string).unwrap_or_default();
        match outcome {
            Upsert::Inserted => info!("Saved new record {}", id),
            Upsert::Replaced => info!("Updated record {}", id),
        }
        Ok(record)
    }

    /// Delete the record `id` if `confirm` accepts it.
    ///
    /// Returns the deleted record. Returns `None`, changing nothing, when
    /// the id is unknown or `confirm` declines.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be persisted.
    pub async fn delete<F>(&mut self, id: &RecordId, confirm: F) -> Result<Option<Record>>
    where
        F: FnOnce(&Record) -> bool + Send,
    {
        let Some(existing) = self.records.get(id) else {
            debug!(%id, "delete of unknown record ignored");
            return Ok(None);
        };
        if !confirm(existing) {
            debug!(%id, "delete declined");
            return Ok(None);
        }

        let mut records = self.records.clone();
        let removed = records.remove(id);
        self.persist_records(&records).await?;
        self.records = records;

        info!("Deleted record {}", id);
        Ok(removed)
    }

    /// Validate and install a new schema template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the template is rejected, or a
    /// store error; the active schema is unchanged in both cases.
    pub async fn replace_schema(&mut self, raw: &serde_json::Value) -> Result<()> {
        let schema = load_schema(raw)?;
        self.install_schema(schema).await
    }

    /// Restore the built-in schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be persisted.
    pub async fn reset_schema(&mut self) -> Result<()> {
        self.install_schema(Schema::default_customer()).await
    }

    async fn install_schema(&mut self, schema: Schema) -> Result<()> {
        let raw = serde_json::to_value(&schema)?;
        self.store.set(SCHEMA_KEY, &raw).await?;

        info!(
            "Schema '{}' installed ({} fields)",
            schema.title,
            schema.fields().count()
        );
        self.schema = schema;
        Ok(())
    }

    /// The active schema as a pretty-printed JSON template.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_schema(&self) -> Result<String> {
        self.schema.to_json_pretty()
    }

    /// Replace every saved record with the contents of a backup document.
    ///
    /// Returns the number of records imported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBackup`] if the document is rejected, or a
    /// store error; the collection is unchanged in both cases.
    pub async fn import_backup(&mut self, raw: &serde_json::Value) -> Result<usize> {
        let records = Collection::from_backup(raw)?;
        self.persist_records(&records).await?;

        let count = records.len();
        self.records = records;
        info!("Imported {} records from backup", count);
        Ok(count)
    }

    /// Every saved record as a pretty-printed JSON backup document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_backup(&self) -> Result<String> {
        self.records.to_backup_string()
    }

    async fn persist_records(&self, records: &Collection) -> Result<()> {
        let raw = serde_json::to_value(records)?;
        self.store.set(CUSTOMERS_KEY, &raw).await
    }
}

async fn stored_schema<S: KeyValueStore>(store: &S, fallback: Schema) -> Result<Schema> {
    match store.get(SCHEMA_KEY).await? {
        Some(raw) => match load_schema(&raw) {
            Ok(schema) => Ok(schema),
            Err(e) => {
                warn!("Stored schema is invalid, using fallback: {}", e);
                Ok(fallback)
            }
        },
        None => {
            debug!("No stored schema, using fallback");
            Ok(fallback)
        }
    }
}
