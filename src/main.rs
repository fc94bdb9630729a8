//! # Inventory Reconcile CLI (`invr`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `invr init` | Create the SQLite database, tables, and categories |
//! | `invr import <file> --as <id>` | Reconcile and upsert an inventory sheet |
//! | `invr users add` / `users list` | Registry administration |
//! | `invr locations add <name>` | Register a location |
//! | `invr lend` / `transfer` / `write-off` / `return` | Asset movements |
//! | `invr trace <item> --as <id>` | History of one item |
//! | `invr history --as <id>` | Latest movements by one user |
//! | `invr resolve <name>` | Show how a name resolves |

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use inventory_reconcile::movements::MovementCommand;
use inventory_reconcile::{config, import, migrate, movements, registry, resolve};

/// Inventory Reconcile CLI: spreadsheet imports with staff-name matching,
/// plus asset movements and their trace log.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/invr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "invr",
    about = "Inventory Reconcile: spreadsheet imports with staff-name matching and asset traceability",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/invr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed the categories.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Import an inventory sheet (CSV or .xlsx).
    ///
    /// Every row must name the requesting user as receiver. Prints one
    /// JSON document, success or error.
    Import {
        /// Path to the CSV export or .xlsx workbook.
        file: PathBuf,

        /// Id of the registered user uploading the sheet.
        #[arg(long = "as")]
        as_user: i64,

        /// Reconcile and report without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage registered users.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Manage locations.
    Locations {
        #[command(subcommand)]
        action: LocationsAction,
    },

    /// Lend an item. The owner does not change.
    Lend {
        item: i64,
        #[arg(long = "as")]
        as_user: i64,
        /// Borrower's user id.
        #[arg(long)]
        to: i64,
        /// Expected return date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        until: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Transfer an item to a new owner.
    Transfer {
        item: i64,
        #[arg(long = "as")]
        as_user: i64,
        /// New owner's user id.
        #[arg(long)]
        to: i64,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Write an item off.
    WriteOff {
        item: i64,
        #[arg(long = "as")]
        as_user: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Record the return of a lent item.
    Return {
        item: i64,
        #[arg(long = "as")]
        as_user: i64,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the trace of one item (owner only).
    Trace {
        item: i64,
        #[arg(long = "as")]
        as_user: i64,
    },

    /// Show the latest movements made by a user.
    History {
        #[arg(long = "as")]
        as_user: i64,
    },

    /// Resolve a name against the registry and show the matching stage.
    Resolve { name: String },
}

#[derive(Subcommand)]
enum UsersAction {
    /// Register a user.
    Add {
        /// Uppercase alphanumeric staff code.
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// `director` or `profesor`.
        #[arg(long, default_value = "profesor")]
        role: String,
        #[arg(long)]
        school: Option<i64>,
    },
    /// List every registered user.
    List,
}

#[derive(Subcommand)]
enum LocationsAction {
    /// Register a location.
    Add { name: String },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}': expected YYYY-MM-DD", s))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,inventory={0},invr={0},inventory_reconcile={0}",
            level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.log.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            file,
            as_user,
            dry_run,
        } => {
            import::run_import(&cfg, &file, as_user, dry_run).await?;
        }
        Commands::Users { action } => match action {
            UsersAction::Add {
                code,
                name,
                email,
                role,
                school,
            } => {
                registry::run_add_user(&cfg, code, name, email, &role, school).await?;
            }
            UsersAction::List => {
                registry::run_list_users(&cfg).await?;
            }
        },
        Commands::Locations { action } => match action {
            LocationsAction::Add { name } => {
                registry::run_add_location(&cfg, &name).await?;
            }
        },
        Commands::Lend {
            item,
            as_user,
            to,
            until,
            notes,
        } => {
            movements::run_movement(&cfg, item, as_user, MovementCommand::Lend { to, until }, notes)
                .await?;
        }
        Commands::Transfer {
            item,
            as_user,
            to,
            notes,
        } => {
            movements::run_movement(&cfg, item, as_user, MovementCommand::Transfer { to }, notes)
                .await?;
        }
        Commands::WriteOff {
            item,
            as_user,
            reason,
            notes,
        } => {
            movements::run_movement(
                &cfg,
                item,
                as_user,
                MovementCommand::WriteOff { reason },
                notes,
            )
            .await?;
        }
        Commands::Return {
            item,
            as_user,
            notes,
        } => {
            movements::run_movement(&cfg, item, as_user, MovementCommand::Return, notes).await?;
        }
        Commands::Trace { item, as_user } => {
            movements::run_trace(&cfg, item, as_user).await?;
        }
        Commands::History { as_user } => {
            movements::run_history(&cfg, as_user).await?;
        }
        Commands::Resolve { name } => {
            resolve::run_resolve(&cfg, &name).await?;
        }
    }

    Ok(())
}
