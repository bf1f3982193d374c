//! bw2kp - Migrate a Bitwarden JSON export into a KeePass database
//!
//! Existing entries are matched by title within their target group and
//! updated in place; everything else is created.

mod config;

use anyhow::Result;
use bw2kp_core::export::split_path;
use bw2kp_core::{migrate, Export, InvalidRecordPolicy, KeepassDatabase, MigrateOptions};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use config::Config;

/// bw2kp - Migrate a Bitwarden JSON export into a KeePass database
#[derive(Parser, Debug)]
#[command(name = "bw2kp")]
#[command(version, about = "Migrate an unencrypted Bitwarden JSON export into a KeePass database")]
struct Args {
    /// Path to the unencrypted Bitwarden JSON export
    #[arg(short, long, value_name = "FILE")]
    export: PathBuf,

    /// Path to the KeePass database file, created if missing (overrides config)
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Key file used together with the master password (overrides config)
    #[arg(short, long, value_name = "FILE")]
    keyfile: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Group receiving the imported entries, e.g. "Imported/Bitwarden"
    #[arg(short, long, value_name = "PATH")]
    group: Option<String>,

    /// Put every entry directly into the target group instead of mirroring folders
    #[arg(long)]
    no_folders: bool,

    /// Stop at the first item without a name instead of skipping it
    #[arg(long)]
    abort_on_invalid: bool,

    /// Run the migration without saving the database
    #[arg(long)]
    dry_run: bool,

    /// Master password of the KeePass database
    #[arg(long, env = "BW2KP_PASSWORD", hide_env_values = true)]
    password: String,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration.
    fn apply_to(&self, config: &mut Config) {
        if let Some(database) = &self.database {
            tracing::info!("Overriding database path from CLI: {}", database.display());
            config.database_path = database.clone();
        }
        if let Some(keyfile) = &self.keyfile {
            config.keyfile = Some(keyfile.clone());
        }
        if let Some(group) = &self.group {
            config.target_group = group.clone();
        }
        if self.no_folders {
            config.mirror_folders = false;
        }
        if self.abort_on_invalid {
            config.abort_on_invalid = true;
        }
    }
}

fn migrate_options(config: &Config) -> MigrateOptions {
    MigrateOptions {
        target_group: split_path(&config.target_group),
        mirror_folders: config.mirror_folders,
        on_invalid: if config.abort_on_invalid {
            InvalidRecordPolicy::Abort
        } else {
            InvalidRecordPolicy::Skip
        },
    }
}

/// Unlock the database at `path`, or start a new one if no file exists there.
///
/// An existing file is never replaced: failing to unlock it is an error.
fn open_or_create(path: &Path, password: &str, keyfile: Option<&Path>) -> Result<KeepassDatabase> {
    if path.exists() {
        KeepassDatabase::unlock(path, password, keyfile)
    } else {
        tracing::info!("No database at {}, creating a new one", path.display());
        KeepassDatabase::create(path, password, keyfile)
    }
}

fn main() -> Result<()> {
    // Pick up BW2KP_PASSWORD from a local .env before clap reads the environment
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bw2kp=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.clone())?;
    args.apply_to(&mut config);
    tracing::info!("Database path: {}", config.database_path.display());

    let export = Export::load(&args.export)?;
    let keyfile = config.keyfile.as_deref();

    let mut db = open_or_create(&config.database_path, &args.password, keyfile)?;

    let report = migrate(&mut db, &export, &migrate_options(&config))?;

    for skipped in &report.skipped {
        println!(
            "Skipped item #{} ({}): {}",
            skipped.index,
            skipped.name.as_deref().unwrap_or("unnamed"),
            skipped.reason
        );
    }

    if args.dry_run {
        tracing::info!("Dry run, database not saved");
    } else {
        db.save()?;
    }

    println!(
        "{} entries created, {} updated, {} skipped",
        report.created,
        report.updated,
        report.skipped.len()
    );

    Ok(())
}
