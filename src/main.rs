use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use boardsync::board::BoardClient;
use boardsync::config::RunConfig;
use boardsync::secrets::Secrets;
use boardsync::suite::SuiteClient;
use boardsync::sync;
use boardsync::{Result, SyncError};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging()?;
    let config = RunConfig::load(&cli.config)?;
    let secrets = obtain_secrets(&cli.env)?;
    let board = BoardClient::new(&config.board_url, &secrets.board_key)?;
    let suite = SuiteClient::new(&config.suite_url, &config.suite_db, &config.suite_model)?;
    let session = suite.authenticate(&secrets.suite_user, &secrets.suite_pass)?;
    info!(
        uid = session.uid(),
        model = suite.model(),
        "authenticated with business suite"
    );

    match cli.command {
        Command::CreateMissing { name } => {
            let report = sync::create_missing(&config, &board, &suite, &session, &name)?;
            println!("planned {} create(s), applied {}", report.planned, report.applied);
        }
        Command::SyncStatus => {
            let report = sync::sync_status(&config, &board, &suite, &session)?;
            println!(
                "planned {} decision(s), applied {}",
                report.planned, report.applied
            );
        }
        Command::ExportRecords { board_name } => {
            let report =
                sync::export_records(&config, &board, &suite, &session, &board_name)?;
            println!("created {} of {} item(s)", report.applied, report.planned);
        }
        Command::Inspect { name, fields } => {
            print_records(&sync::inspect_records(&config, &suite, &session, &name, &fields)?);
        }
        Command::Purge {
            board_items,
            target,
        } => {
            let deleted = sync::purge(&board, &suite, &session, &board_items, target)?;
            println!("deleted {deleted} record(s)");
        }
        Command::Fields => {
            let metadata = suite.fields_get(&session)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Boards => {
            for (id, name) in board.boards()? {
                println!("{id}\t{name}");
            }
        }
        Command::Columns => {
            for (id, title) in board.board_columns(config.board_id)? {
                println!("{id}\t{title}");
            }
        }
        Command::SetColumn {
            item,
            column,
            value,
        } => {
            board.change_column_value(config.board_id, item, &column, &value)?;
            println!("column '{column}' updated on item {item}");
        }
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| SyncError::Logging(error.to_string()))
}

/// Loads stored secrets, prompting for them once when none are stored yet.
fn obtain_secrets(path: &PathBuf) -> Result<Secrets> {
    if let Some(secrets) = Secrets::load(path)? {
        return Ok(secrets);
    }
    let secrets = Secrets {
        board_key: prompt("What is your board-service API key?")?,
        suite_user: prompt("What is your business-suite username?")?,
        suite_pass: prompt("What is your business-suite password?")?,
    };
    secrets.save(path)?;
    println!("Secrets saved. You won't be asked these again.");
    Ok(secrets)
}

fn prompt(question: &str) -> Result<String> {
    println!("{question}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(SyncError::MissingCredentials);
    }
    Ok(answer.to_string())
}

fn print_records(records: &[boardsync::model::TargetRecord]) {
    if records.is_empty() {
        println!("no matching records");
        return;
    }
    for record in records {
        let rendered: Vec<String> = record
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        println!("{}: {}", record.id, rendered.join(", "));
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Reconcile records between a work-tracking board and a business suite."
)]
struct Cli {
    /// Run configuration file.
    #[arg(long, default_value = "boardsync.json")]
    config: PathBuf,

    /// Credential file holding the API key and suite login.
    #[arg(long, default_value = ".env")]
    env: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror board items with the given name into the suite when absent.
    CreateMissing {
        /// Exact item name to mirror.
        #[arg(long)]
        name: String,
    },

    /// Upsert suite records from the board's status column.
    SyncStatus,

    /// Create a fresh board and mirror suite records onto it.
    ExportRecords {
        /// Name of the board to create.
        #[arg(long)]
        board_name: String,
    },

    /// Print fields of suite records matching a name.
    Inspect {
        /// Exact display name to look up.
        #[arg(long)]
        name: String,

        /// Fields to read, comma separated.
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Delete board items by id and optionally every suite record.
    Purge {
        /// Board item ids to delete, comma separated.
        #[arg(long, value_delimiter = ',')]
        board_items: Vec<u64>,

        /// Also unlink every record of the configured suite model.
        #[arg(long)]
        target: bool,
    },

    /// List the boards visible to the configured API key.
    Boards,

    /// List the columns of the configured board.
    Columns,

    /// Overwrite the rendered value of one column on one item.
    SetColumn {
        /// Board item id to change.
        #[arg(long)]
        item: u64,

        /// Column id to overwrite.
        #[arg(long)]
        column: String,

        /// New rendered value.
        #[arg(long)]
        value: String,
    },

    /// Print field metadata of the configured suite model.
    Fields,
}
