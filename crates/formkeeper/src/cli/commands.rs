//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Parse a `NAME=VALUE` pair. The value may be empty or contain `=`.
///
/// # Errors
///
/// Returns an error message if there is no `=` or the name is empty.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Record commands.
#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    /// Create and save a new record
    Add {
        /// Field value to set (repeatable)
        #[arg(short = 's', long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },

    /// Change fields of a saved record
    Edit {
        /// Record id
        id: String,

        /// Field value to set (repeatable); an empty value clears the field
        #[arg(short = 's', long = "set", value_name = "ID=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },

    /// Show one record with its calculated fields
    Show {
        /// Record id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List saved records, newest first
    List {
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Schema commands.
#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Show the active schema
    Show {
        /// Output the JSON template
        #[arg(short, long)]
        json: bool,
    },

    /// Install a schema from a JSON template file
    Import {
        /// Template file
        file: PathBuf,
    },

    /// Write the active schema as a JSON template
    Export {
        /// Output file (defaults to stdout)
        file: Option<PathBuf>,
    },

    /// Check a JSON template file without installing it
    Validate {
        /// Template file
        file: PathBuf,
    },

    /// Restore the built-in schema
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Backup commands.
#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Write every record to a JSON backup
    Export {
        /// Output file (defaults to stdout)
        file: Option<PathBuf>,
    },

    /// Replace every record with the contents of a JSON backup
    Import {
        /// Backup file
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Document export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Record id
    pub id: String,

    /// Document format
    #[arg(short, long, value_enum, default_value = "pdf")]
    pub format: DocumentFormat,

    /// Output file (defaults to `<output_dir>/<id>.<ext>`)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Formula commands.
#[derive(Debug, Subcommand)]
pub enum FormulaCommand {
    /// Evaluate an expression
    Eval {
        /// The expression
        expression: String,

        /// Variable binding (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        vars: Vec<(String, String)>,
    },

    /// Check every formula of the active schema
    Check,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Exported document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DocumentFormat {
    /// Single-page PDF
    #[default]
    Pdf,
    /// Plain text
    Text,
}

impl DocumentFormat {
    /// File extension for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}
