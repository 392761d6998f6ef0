use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LOG_FILE_NAME: &str = "rcs-metadata.log";

struct FileLogger {
    file: Mutex<Option<File>>,
    log_path: PathBuf,
}

impl FileLogger {
    fn new(log_path: PathBuf) -> Self {
        // Truncate on startup; each run gets a fresh log
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)
            .ok();

        FileLogger {
            file: Mutex::new(file),
            log_path,
        }
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let level = record.level();
            let target = record.target();
            let message = record.args();

            let log_line = format!("[{timestamp}] [{level:5}] [{target}] {message}\n");

            if let Ok(mut guard) = self.file.lock() {
                if let Some(ref mut file) = *guard {
                    let _ = file.write_all(log_line.as_bytes());
                    let _ = file.flush();
                }
            }

            // Also print to stderr in dev mode
            #[cfg(debug_assertions)]
            eprint!("{}", log_line);
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.flush();
            }
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcs-session-metadata")
}

static LOGGER: std::sync::OnceLock<FileLogger> = std::sync::OnceLock::new();

/// Initialize logging.
///
/// With a log dir (or `RCS_METADATA_FILE_LOG` set) lines go to a file in that
/// dir, falling back to the cache dir. Otherwise `env_logger` is installed,
/// filtered by `RUST_LOG` (default `info`).
pub fn init(log_dir: Option<&Path>) -> Result<(), SetLoggerError> {
    let dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None if file_logging_requested() => default_log_dir(),
        None => {
            return env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }
    };
    let _ = std::fs::create_dir_all(&dir);

    let logger = LOGGER.get_or_init(|| FileLogger::new(dir.join(LOG_FILE_NAME)));
    log::set_logger(logger)?;
    log::set_max_level(LevelFilter::Debug);

    log::info!("=== RCS session metadata log started ===");
    log::info!("Log file: {:?}", logger.log_path);

    Ok(())
}

fn file_logging_requested() -> bool {
    std::env::var("RCS_METADATA_FILE_LOG")
        .map(|value| {
            let trimmed = value.trim();
            !trimmed.is_empty() && trimmed != "0"
        })
        .unwrap_or(false)
}

/// Path the file logger writes to for a given log dir
pub fn get_log_file_path(log_dir: Option<&Path>) -> PathBuf {
    log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(default_log_dir)
        .join(LOG_FILE_NAME)
}
