//! costlens CLI - ask questions about cloud billing data
//!
//! Usage:
//!   costlens ask "<question>" [--execute] [--json] [--no-clarify]
//!   costlens validate "<sql>" [--json]
//!   costlens catalog export [--mode predefined|introspected] [--output FILE]
//!   costlens catalog show
//!
//! Examples:
//!   costlens ask "What is the total cost?" --execute
//!   costlens ask "Show me top 5 services by cost for AWS last month" --json
//!   costlens validate "SELECT SUM(billedcost) FROM aws_cost_usage GROUP BY servicename"

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use costlens::catalog::{Catalog, CatalogMode};
use costlens::clarify::{ClarificationContext, ClarificationSlot};
use costlens::config::Settings;
use costlens::engine::load_catalog;
use costlens::storage::{QueryResult, SqliteStorage};
use costlens::{Answer, Engine, PreparedQuery};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "costlens")]
#[command(about = "costlens - natural-language questions over cloud billing data")]
#[command(version)]
struct Cli {
    /// Path to a costlens.toml (defaults to the usual search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a question to SQL, asking for missing context on stdin
    Ask {
        question: String,

        /// Run the SQL and print the rows
        #[arg(short, long)]
        execute: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Skip clarification and generate straight away
        #[arg(long)]
        no_clarify: bool,
    },

    /// Parse and repair SQL text
    Validate {
        sql: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Inspect the metadata catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Write the catalog document as JSON
    Export {
        /// How to build the catalog (defaults to the configured mode)
        #[arg(short, long)]
        mode: Option<ModeArg>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List tables and columns with their classification
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Predefined,
    Introspected,
}

impl From<ModeArg> for CatalogMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Predefined => CatalogMode::Predefined,
            ModeArg::Introspected => CatalogMode::Introspected,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("costlens=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let mut settings = match loaded {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Ask {
            question,
            execute,
            json,
            no_clarify,
        } => {
            if no_clarify {
                settings.clarification.enabled = false;
            }
            cmd_ask(&settings, &question, execute, json).await
        }
        Commands::Validate { sql, json } => cmd_validate(&settings, &sql, json).await,
        Commands::Catalog { command } => match command {
            CatalogCommand::Export { mode, output } => {
                if let Some(mode) = mode {
                    settings.catalog.mode = mode.into();
                }
                cmd_catalog_export(&settings, output).await
            }
            CatalogCommand::Show => cmd_catalog_show(&settings).await,
        },
    }
}

async fn cmd_ask(settings: &Settings, question: &str, execute: bool, json: bool) -> ExitCode {
    let engine = match Engine::from_settings(settings).await {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut answer = engine.ask(question, None).await;
    let query = loop {
        let context = match answer {
            Ok(Answer::Ready(query)) => break query,
            Ok(Answer::NeedsClarification(context)) => context,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        let Some(choice) = prompt_choice(&context) else {
            eprintln!("No answer given, stopping.");
            return ExitCode::FAILURE;
        };
        answer = engine.resolve(context, &choice).await;
    };

    let rows = if execute {
        match engine.execute(&query).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        None
    };

    if json {
        let value = serde_json::json!({
            "query": query,
            "rows": rows.as_ref().map(QueryResult::to_records),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_query(&query);
        if let Some(rows) = &rows {
            print_rows(rows);
        }
    }
    ExitCode::SUCCESS
}

/// Ask the pending slot on stderr and read one line from stdin.
fn prompt_choice(context: &ClarificationContext) -> Option<String> {
    let slot: &ClarificationSlot = context.pending.as_ref()?;
    let mut err = io::stderr();
    let _ = writeln!(err, "{}", slot.question);
    for (i, option) in slot.options.iter().enumerate() {
        match &option.description {
            Some(d) => {
                let _ = writeln!(err, "  {}. {} ({})", i + 1, option.label, d);
            }
            None => {
                let _ = writeln!(err, "  {}. {}", i + 1, option.label);
            }
        }
    }
    let _ = write!(err, "> ");
    let _ = err.flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()).filter(|l| !l.is_empty()),
    }
}

fn print_query(query: &PreparedQuery) {
    println!("-- Question: {}", query.question);
    println!("-- Method: {}", query.method);
    for warning in &query.warnings {
        println!("-- Warning: {}", warning);
    }
    println!("{}", query.sql);
}

fn print_rows(result: &QueryResult) {
    println!();
    println!("{}", result.columns.join(" | "));
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    if result.truncated {
        println!("({} rows shown, more available)", result.row_count());
    } else {
        println!("({} rows)", result.row_count());
    }
}

async fn cmd_validate(settings: &Settings, sql: &str, json: bool) -> ExitCode {
    let catalog = match build_catalog(settings).await {
        Ok(c) => c,
        Err(code) => return code,
    };
    let validator = costlens::validation::SqlStructuralValidator::new(&catalog);

    match validator.validate_text(sql) {
        Ok(validated) => {
            if json {
                match serde_json::to_string_pretty(&validated) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                for warning in &validated.warnings {
                    println!("-- Warning: {}", warning);
                }
                println!("{}", validated.sql);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Malformed SQL: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_catalog_export(settings: &Settings, output: Option<PathBuf>) -> ExitCode {
    let catalog = match build_catalog(settings).await {
        Ok(c) => c,
        Err(code) => return code,
    };
    let json = match catalog.to_json() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, json) {
                eprintln!("Error writing '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
            eprintln!("Wrote {} tables to {}", catalog.len(), path.display());
        }
        None => println!("{}", json),
    }
    ExitCode::SUCCESS
}

async fn cmd_catalog_show(settings: &Settings) -> ExitCode {
    let catalog = match build_catalog(settings).await {
        Ok(c) => c,
        Err(code) => return code,
    };

    for table in catalog.tables() {
        let provider = table.provider().map(|p| p.label()).unwrap_or("-");
        println!("{} (provider: {})", table.name, provider);
        if !table.description.is_empty() {
            println!("  {}", table.description);
        }
        for column in table.columns.values() {
            let mut flags = Vec::new();
            if column.groupable {
                flags.push("groupable".to_string());
            }
            if column.filterable {
                flags.push("filterable".to_string());
            }
            if let Some(agg) = column.default_aggregate {
                flags.push(format!("default {}", agg));
            }
            if let Some(unit) = &column.unit {
                flags.push(unit.clone());
            }
            println!(
                "  - {} {} {:?} [{}]",
                column.name,
                column.data_type.sql_name(),
                column.category,
                flags.join(", ")
            );
        }
        println!();
    }
    ExitCode::SUCCESS
}

/// Catalog for the commands that do not need a full engine.
async fn build_catalog(settings: &Settings) -> Result<Catalog, ExitCode> {
    let path = match settings.storage.resolved_database() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };
    let storage = match SqliteStorage::open(&path, settings.storage.row_limit) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path.display(), e);
            return Err(ExitCode::FAILURE);
        }
    };
    let cache = if settings.catalog.cache_enabled {
        costlens::cache::CatalogCache::open()
            .map_err(|e| tracing::warn!(error = %e, "catalog cache unavailable"))
            .ok()
    } else {
        None
    };

    load_catalog(&settings.catalog, &storage, cache.as_ref())
        .await
        .map_err(|e| {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        })
}
