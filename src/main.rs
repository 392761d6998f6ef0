use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rcs_session_metadata::batch::run_batch;
use rcs_session_metadata::config::{get_config_path, load_config};
use rcs_session_metadata::db::MetadataDatabase;
use rcs_session_metadata::logging;
use rcs_session_metadata::reference::ReferenceTable;
use rcs_session_metadata::session::{extract_session_metadata, probe};

/// Session metadata extraction for Summit RC+S recordings.
#[derive(Parser, Debug)]
#[command(name = "rcs-metadata", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (default: $RCS_METADATA_CONFIG or the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one session and print its record as JSON.
    Extract {
        /// Session folder, its Device folder, or DeviceSettings.json.
        session_dir: PathBuf,
    },

    /// Extract every session under the data root and write the database.
    Batch {
        /// Data root to scan (default: from config).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Database file (default: from config).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Probe one raw streaming file and print the result as JSON.
    Probe { file: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(get_config_path);
    let mut config = load_config(&config_path)?;
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir.clone();
    }
    logging::init(config.log_dir.as_deref())?;
    if config.log_dir.is_some() {
        eprintln!(
            "Logging to {}",
            logging::get_log_file_path(config.log_dir.as_deref()).display()
        );
    }

    let reference = match &config.reference_table_path {
        Some(path) => Some(Arc::new(ReferenceTable::load(path)?)),
        None => None,
    };

    match cli.command {
        Command::Extract { session_dir } => {
            let record = extract_session_metadata(
                &session_dir,
                &config.extraction_options(),
                reference.as_deref(),
            )?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Batch { root, db } => {
            if let Some(root) = root {
                config.data_root = root;
            }
            if let Some(db) = db {
                config.database_path = db;
            }

            let report = run_batch(&config, reference);
            let mut database = MetadataDatabase::open(&config.database_path)?;
            let written = database.write_records(&report.records)?;

            println!(
                "{} session(s) written to {}, {} failed, {} skipped as too recent",
                written,
                config.database_path.display(),
                report.failures.len(),
                report.skipped_young.len()
            );
            for failure in &report.failures {
                println!(
                    "  {:?} {}: {}",
                    failure.kind,
                    failure.session_dir.display(),
                    failure.message
                );
            }
            if !report.failures.is_empty() {
                std::process::exit(1);
            }
        }

        Command::Probe { file } => {
            let result = probe(&file, &config.probe)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
