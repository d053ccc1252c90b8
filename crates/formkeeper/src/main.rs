//! `fkeep` - CLI for formkeeper
//!
//! This binary provides the command-line interface for keeping customer
//! records, managing the schema template, and exporting backups and documents.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context};
use clap::Parser;

use formkeeper::cli::{
    BackupCommand, Cli, Command, ConfigCommand, DocumentFormat, ExportCommand, FormulaCommand,
    RecordCommand, SchemaCommand,
};
use formkeeper::export::{
    document_file_name, document_lines, render_pdf, render_text, ExportOptions,
};
use formkeeper::formula::{parse, sanitize, Scope};
use formkeeper::{
    evaluate, init_logging, Config, Error, FieldKind, Record, RecordId, Schema, Storage, Value,
    Workbook,
};

type Result<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Status(cmd) => handle_status(&config, cmd.json).await,
        Command::Record(cmd) => handle_record(&config, cmd).await,
        Command::Schema(cmd) => handle_schema(&config, cmd).await,
        Command::Backup(cmd) => handle_backup(&config, cmd).await,
        Command::Export(cmd) => handle_export(&config, &cmd).await,
        Command::Formula(cmd) => handle_formula(&config, cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Schema used when the store holds none.
fn fallback_schema(config: &Config) -> Result<Schema> {
    match &config.schema.template_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read schema template {}", path.display()))?;
            Schema::from_json_str(&text)
                .with_context(|| format!("schema template {} is invalid", path.display()))
        }
        None => Ok(Schema::default_customer()),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("failed to open record store {}", path.display()))?;
    Ok(storage)
}

async fn open_workbook(config: &Config) -> Result<Workbook<Storage>> {
    let workbook = Workbook::open(open_storage(config)?, fallback_schema(config)?).await?;
    Ok(workbook)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn write_or_print(file: Option<&Path>, text: &str) -> Result<()> {
    match file {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Ask a yes/no question on the terminal; anything but `y`/`yes` declines.
fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn format_timestamp(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

async fn handle_status(config: &Config, json: bool) -> Result<()> {
    let workbook = open_workbook(config).await?;
    let stats = workbook.store().stats()?;
    let schema = workbook.schema();
    let calculated = schema.calculated_fields().count();

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "records": workbook.records().len(),
            "schema_title": schema.title,
            "sections": schema.sections.len(),
            "fields": schema.fields().count(),
            "calculated_fields": calculated,
            "stored_keys": stats.total_keys,
            "last_updated": stats.last_updated,
            "layout_version": stats.layout_version,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("fkeep status");
        println!("------------");
        println!("Database:      {}", config.database_path().display());
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!("Last write:    {}", format_timestamp(stats.last_updated));
        println!("Records:       {}", workbook.records().len());
        println!("Schema:        {}", schema.title);
        println!(
            "Fields:        {} in {} sections ({} calculated)",
            schema.fields().count(),
            schema.sections.len(),
            calculated
        );
    }
    Ok(())
}

fn apply_values(
    workbook: &Workbook<Storage>,
    draft: &mut Record,
    values: &[(String, String)],
) -> Result<()> {
    for (field, input) in values {
        workbook.apply_input(draft, field, input)?;
    }
    Ok(())
}

fn print_record(config: &Config, workbook: &Workbook<Storage>, record: &Record) {
    let options = ExportOptions::from(&config.export);
    let lines = document_lines(workbook.schema(), record, &options);
    print!("{}", render_text(&lines));
}

async fn handle_record(config: &Config, cmd: RecordCommand) -> Result<()> {
    let mut workbook = open_workbook(config).await?;

    match cmd {
        RecordCommand::Add { values } => {
            let mut draft = workbook.new_draft();
            apply_values(&workbook, &mut draft, &values)?;
            let saved = workbook.save(draft).await?;
            print_record(config, &workbook, &saved);
        }
        RecordCommand::Edit { id, values } => {
            if values.is_empty() {
                bail!("nothing to change; pass at least one --set ID=VALUE");
            }
            let mut draft = workbook.draft_for(&RecordId::from(id))?;
            apply_values(&workbook, &mut draft, &values)?;
            let saved = workbook.save(draft).await?;
            print_record(config, &workbook, &saved);
        }
        RecordCommand::Show { id, json } => {
            let record = workbook.draft_for(&RecordId::from(id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(config, &workbook, &record);
            }
        }
        RecordCommand::List { limit, json } => {
            let limit = limit.unwrap_or(usize::MAX);
            let records: Vec<&Record> = workbook.records().iter().take(limit).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No records.");
            } else {
                for record in records {
                    let id = record.id.as_ref().map_or("-", RecordId::as_str);
                    println!(
                        "{id}  {}  {}",
                        format_timestamp(record.updated_at),
                        record.summary(workbook.schema())
                    );
                }
            }
        }
        RecordCommand::Delete { id, yes } => {
            let id = RecordId::from(id);
            let Some(summary) = workbook
                .records()
                .get(&id)
                .map(|r| r.summary(workbook.schema()))
            else {
                println!("No record with id {id}; nothing deleted.");
                return Ok(());
            };

            let prompt = format!("Delete record {id} ({summary})?");
            match workbook.delete(&id, move |_| yes || confirm(&prompt)).await? {
                Some(_) => println!("Deleted record {id}."),
                None => println!("Cancelled."),
            }
        }
    }
    Ok(())
}

fn print_schema(schema: &Schema) {
    println!("{}", schema.title);
    println!("{}", "=".repeat(schema.title.chars().count()));
    for section in &schema.sections {
        println!();
        println!("[{}] {} ({} columns)", section.id, section.title, section.columns);
        for field in &section.fields {
            let mut line = format!(
                "  {:<24} {:<10} {}",
                field.id,
                field.kind.to_string(),
                field.display_label()
            );
            if let Some(formula) = field.formula() {
                line.push_str(&format!("  = {formula}"));
            }
            if field.is_currency() {
                line.push_str("  (currency)");
            }
            println!("{line}");
        }
    }
}

async fn handle_schema(config: &Config, cmd: SchemaCommand) -> Result<()> {
    if let SchemaCommand::Validate { file } = &cmd {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let schema = Schema::from_json_str(&text)?;
        println!(
            "{} is valid: {} sections, {} fields ({} calculated)",
            file.display(),
            schema.sections.len(),
            schema.fields().count(),
            schema.calculated_fields().count()
        );
        return Ok(());
    }

    let mut workbook = open_workbook(config).await?;
    match cmd {
        SchemaCommand::Show { json } => {
            if json {
                println!("{}", workbook.export_schema()?);
            } else {
                print_schema(workbook.schema());
            }
        }
        SchemaCommand::Import { file } => {
            let raw = read_json(&file)?;
            workbook.replace_schema(&raw).await?;
            println!(
                "Installed schema '{}' from {}.",
                workbook.schema().title,
                file.display()
            );
        }
        SchemaCommand::Export { file } => {
            write_or_print(file.as_deref(), &workbook.export_schema()?)?;
        }
        SchemaCommand::Reset { yes } => {
            if yes || confirm("Replace the active schema with the built-in one?") {
                workbook.reset_schema().await?;
                println!("Schema reset to '{}'.", workbook.schema().title);
            } else {
                println!("Cancelled.");
            }
        }
        SchemaCommand::Validate { .. } => {}
    }
    Ok(())
}

async fn handle_backup(config: &Config, cmd: BackupCommand) -> Result<()> {
    match cmd {
        BackupCommand::Export { file } => {
            let workbook = open_workbook(config).await?;
            write_or_print(file.as_deref(), &workbook.export_backup()?)?;
        }
        BackupCommand::Import { file, yes } => {
            let raw = read_json(&file).map_err(|e| Error::invalid_backup(format!("{e:#}")))?;
            let storage = open_storage(config)?;
            let (mut workbook, rejected) =
                Workbook::open_for_restore(storage, fallback_schema(config)?).await?;

            let prompt = match rejected {
                Some(e) => format!(
                    "Saved records could not be read ({e}). Replace them with the contents of {}?",
                    file.display()
                ),
                None => format!(
                    "Replace all {} saved records with the contents of {}?",
                    workbook.records().len(),
                    file.display()
                ),
            };
            if yes || confirm(&prompt) {
                let count = workbook.import_backup(&raw).await?;
                println!("Imported {count} records.");
            } else {
                println!("Cancelled.");
            }
        }
    }
    Ok(())
}

async fn handle_export(config: &Config, cmd: &ExportCommand) -> Result<()> {
    let workbook = open_workbook(config).await?;
    let id = RecordId::from(cmd.id.as_str());
    let record = workbook.draft_for(&id)?;

    let options = ExportOptions::from(&config.export);
    let lines = document_lines(workbook.schema(), &record, &options);
    let bytes = match cmd.format {
        DocumentFormat::Pdf => render_pdf(&lines, &options)?,
        DocumentFormat::Text => render_text(&lines).into_bytes(),
    };

    let path = cmd.output.clone().unwrap_or_else(|| {
        config
            .output_dir()
            .join(document_file_name(&id, cmd.format.extension()))
    });
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;

    println!("Exported record {id} to {}", path.display());
    Ok(())
}

async fn handle_formula(config: &Config, cmd: FormulaCommand) -> Result<()> {
    match cmd {
        FormulaCommand::Eval { expression, vars } => {
            let scope: Scope = vars
                .iter()
                .map(|(name, value)| (name.clone(), Value::from_input(value, &FieldKind::Number)))
                .collect();

            match evaluate(&expression, &scope) {
                Some(result) => println!("{result}"),
                None => {
                    if let Err(e) = parse(&sanitize(&expression)) {
                        eprintln!("{e}");
                    }
                    println!("(empty)");
                }
            }
        }
        FormulaCommand::Check => {
            let workbook = open_workbook(config).await?;
            let schema = workbook.schema();
            let mut errors = 0;

            for (field, formula) in schema.calculated_fields() {
                match parse(&sanitize(formula)) {
                    Ok(expr) => {
                        let unknown: Vec<&str> = expr
                            .variables()
                            .into_iter()
                            .filter(|name| schema.field(name).is_none())
                            .collect();
                        if unknown.is_empty() {
                            println!("ok     {}", field.id);
                        } else {
                            println!(
                                "ok     {} (unknown names evaluate to 0: {})",
                                field.id,
                                unknown.join(", ")
                            );
                        }
                    }
                    Err(e) => {
                        errors += 1;
                        println!("error  {}: {e}", field.id);
                    }
                }
            }

            if errors > 0 {
                bail!("{errors} formula(s) failed to parse");
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:   {}", config.database_path().display());
                println!();
                println!("[Schema]");
                match &config.schema.template_path {
                    Some(path) => println!("  Template:        {}", path.display()),
                    None => println!("  Template:        (built-in)"),
                }
                println!();
                println!("[Export]");
                println!("  Currency symbol: {}", config.export.currency_symbol);
                println!("  Page size:       {:?}", config.export.page_size);
                println!("  Font size:       {}", config.export.font_size);
                println!("  Output dir:      {}", config.output_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
