//! `formkeeper` - Schema-driven local record keeping with calculated fields
//!
//! Records are described by a JSON schema template. Calculated fields are
//! arithmetic formulas over other fields, recomputed to a fixpoint whenever a
//! record changes. Records and the active schema persist in a local key-value
//! store and can be exported as backups or single-page documents.
//!
//! ```
//! use formkeeper::{compute_record, Record, Schema, Value};
//!
//! let schema = Schema::default_customer();
//! let mut draft = Record::blank(&schema);
//! draft.set("nights_owned", 10.0);
//! draft.set("nights_used_ytd", 3.0);
//!
//! let record = compute_record(&schema, &draft);
//! assert_eq!(record.get("remaining_nights"), Some(&Value::Number(7.0)));
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod formula;
pub mod logging;
pub mod record;
pub mod schema;
pub mod storage;
pub mod workbook;

pub use collection::{Collection, Upsert};
pub use config::Config;
pub use engine::{compute_record, compute_with_report, Computation, MAX_PASSES};
pub use error::{Error, Result};
pub use formula::evaluate;
pub use logging::init_logging;
pub use record::{Record, RecordId, Value};
pub use schema::{load_schema, Field, FieldKind, Schema, Section};
pub use storage::{KeyValueStore, MemoryStore, Storage, StorageStats};
pub use workbook::Workbook;
