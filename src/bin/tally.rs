//! TallyDB operator CLI
//!
//! Inspect, verify and back up a TallyDB data root.

use clap::{Parser, Subcommand};
use tallydb::config::IntegrityMode;
use tallydb::{AppContext, Config};
use tracing_subscriber::{fmt, EnvFilter};

/// TallyDB CLI
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Operator tool for TallyDB data roots")]
#[command(version)]
struct Args {
    /// Root directory
    #[arg(short, long, default_value = "./tally_data")]
    root: String,

    /// Recompute every checksum instead of trusting unchanged timestamps
    #[arg(long)]
    always_checksum: bool,

    /// Backup retention length (used when none is stored)
    #[arg(long, default_value = "10")]
    retention: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show manifest version, publish state and corruption flag
    Status,

    /// Run the integrity test against the manifest
    Verify,

    /// Rescan the data directory and step the manifest version on change
    Commit,

    /// Run one backup cycle (backup + eviction of the oldest surplus version)
    Backup,

    /// List backup versions, newest first
    Backups,

    /// Store a new backup retention length
    SetRetention {
        /// Number of versions to keep
        count: usize,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tallydb=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mode = if args.always_checksum {
        IntegrityMode::AlwaysChecksum
    } else {
        IntegrityMode::TrustTimestamps
    };
    let config = Config::builder()
        .root_dir(&args.root)
        .integrity_mode(mode)
        .backup_retention(args.retention)
        .build();

    if let Err(e) = run(config, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: Config, command: Commands) -> tallydb::Result<()> {
    let mut context = AppContext::open(config)?;

    match command {
        Commands::Status => {
            let dataset = context.dataset();
            let local = dataset.local();
            println!("root:           {}", dataset.root().display());
            println!("version:        {}", local.version());
            println!("branch version: {}", local.branch_version());
            println!("uncommitted:    {}", local.has_uncommitted_changes());
            println!("files:          {}", local.index().files().len());
            println!("corrupted:      {}", dataset.is_corrupted());
        }
        Commands::Verify => {
            context.dataset().local().data_integrity_test()?;
            println!("OK");
        }
        Commands::Commit => {
            let version = context.commit()?;
            println!("manifest at version {}", version);
        }
        Commands::Backup => match context.backup()? {
            Some(version) => println!("backed up version {}", version),
            None => println!("no backup written"),
        },
        Commands::Backups => {
            for backup in context.backups().get_all_backups()? {
                let marker = if backup.is_corrupted() { " (corrupted)" } else { "" };
                println!("{}{}", backup.version(), marker);
            }
        }
        Commands::SetRetention { count } => {
            context.backups().set_retention_length(count)?;
            println!("retention set to {}", count);
        }
    }

    Ok(())
}
