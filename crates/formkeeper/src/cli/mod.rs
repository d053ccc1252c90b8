//! Command-line interface for formkeeper.
//!
//! This module provides the CLI structure for the `fkeep` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    parse_assignment, BackupCommand, ConfigCommand, DocumentFormat, ExportCommand,
    FormulaCommand, RecordCommand, SchemaCommand, StatusCommand,
};

/// fkeep - Keep customer records with calculated fields
///
/// Records follow a JSON schema template. Calculated fields are derived from
/// formulas over other fields and recomputed on every change.
#[derive(Debug, Parser)]
#[command(name = "fkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show store and schema status
    Status(StatusCommand),

    /// Create, edit, view and delete records
    #[command(subcommand)]
    Record(RecordCommand),

    /// Manage the schema template
    #[command(subcommand)]
    Schema(SchemaCommand),

    /// Export or import a full backup
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Export a record as a document
    Export(ExportCommand),

    /// Evaluate and check formulas
    #[command(subcommand)]
    Formula(FormulaCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "fkeep");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["fkeep", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["fkeep", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["fkeep", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["fkeep", "-vvv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["fkeep", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_record_add() {
        let cli = parse(&[
            "fkeep",
            "record",
            "add",
            "--set",
            "first_name=Ada",
            "-s",
            "nights_owned=10",
        ]);
        match cli.command {
            Command::Record(RecordCommand::Add { values }) => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[1], ("nights_owned".to_string(), "10".to_string()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_record_add_rejects_bad_assignment() {
        assert!(Cli::try_parse_from(["fkeep", "record", "add", "--set", "oops"]).is_err());
    }

    #[test]
    fn test_parse_record_delete() {
        let cli = parse(&["fkeep", "record", "delete", "abc", "--yes"]);
        assert!(matches!(
            cli.command,
            Command::Record(RecordCommand::Delete { yes: true, .. })
        ));
    }

    #[test]
    fn test_parse_record_list() {
        let cli = parse(&["fkeep", "record", "list", "--limit", "5", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Record(RecordCommand::List {
                limit: Some(5),
                json: true
            })
        ));
    }

    #[test]
    fn test_parse_schema_export_to_stdout() {
        let cli = parse(&["fkeep", "schema", "export"]);
        assert!(matches!(
            cli.command,
            Command::Schema(SchemaCommand::Export { file: None })
        ));
    }

    #[test]
    fn test_parse_backup_import() {
        let cli = parse(&["fkeep", "backup", "import", "backup.json"]);
        match cli.command {
            Command::Backup(BackupCommand::Import { file, yes }) => {
                assert_eq!(file, PathBuf::from("backup.json"));
                assert!(!yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_export() {
        let cli = parse(&["fkeep", "export", "abc", "--format", "text", "-o", "out.txt"]);
        match cli.command {
            Command::Export(cmd) => {
                assert_eq!(cmd.id, "abc");
                assert_eq!(cmd.format, DocumentFormat::Text);
                assert_eq!(cmd.output, Some(PathBuf::from("out.txt")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_formula_eval() {
        let cli = parse(&["fkeep", "formula", "eval", "a * 2", "--var", "a=21"]);
        match cli.command {
            Command::Formula(FormulaCommand::Eval { expression, vars }) => {
                assert_eq!(expression, "a * 2");
                assert_eq!(vars, vec![("a".to_string(), "21".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_path() {
        let cli = parse(&["fkeep", "config", "path"]);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Path)));
    }
}
