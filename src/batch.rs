//! Batch driver: discover session folders, filter out ones still being
//! recorded, and extract them on a fixed pool of worker threads.
//!
//! Each session runs on its own thread under a timeout. A session that
//! overruns is reported and its result discarded if it ever arrives.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ReconcilerConfig;
use crate::reference::ReferenceTable;
use crate::session::parser::{is_session_dir_name, session_age};
use crate::session::{extract_session_metadata, ReconcileError, SessionMetadataRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Extraction returned a fatal-to-session error
    Fatal,
    TimedOut,
    /// The extraction thread panicked
    Panicked,
    /// Another folder in the batch resolved to the same session id
    DuplicateSessionId,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub session_dir: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful records, ordered by session id
    pub records: Vec<SessionMetadataRecord>,
    pub failures: Vec<BatchFailure>,
    /// Folders held back by the age filter
    pub skipped_young: Vec<PathBuf>,
}

/// Every `Session<digits>` folder under `root`, sorted. Session folders are
/// not searched for nested sessions.
pub fn discover_sessions(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list {:?}: {}", dir, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_session_dir_name(&name) {
                found.push(path);
            } else {
                pending.push(path);
            }
        }
    }

    found.sort();
    log::debug!("Discovered {} session folder(s) under {:?}", found.len(), root);
    found
}

/// Split sessions into (old enough to process, too young)
pub fn filter_by_age(
    sessions: Vec<PathBuf>,
    min_age_hours: f64,
    now: DateTime<Utc>,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    if min_age_hours <= 0.0 {
        return (sessions, Vec::new());
    }
    let min_age = chrono::Duration::milliseconds((min_age_hours * 3_600_000.0) as i64);

    sessions.into_iter().partition(|dir| {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        session_age(&name, now) >= min_age
    })
}

/// Discover, filter and extract every session under `config.data_root`
pub fn run_batch(config: &ReconcilerConfig, reference: Option<Arc<ReferenceTable>>) -> BatchReport {
    let started = Instant::now();
    let sessions = discover_sessions(&config.data_root);
    let (ready, skipped_young) =
        filter_by_age(sessions, config.min_session_age_hours, Utc::now());
    for dir in &skipped_young {
        log::info!("Skipping {:?}: younger than {}h", dir, config.min_session_age_hours);
    }

    let options = config.extraction_options();
    let timeout = Duration::from_secs(config.session_timeout_secs);
    let job = move |dir: &Path| extract_session_metadata(dir, &options, reference.as_deref());

    let mut report = run_pool(ready, config.workers, timeout, job);
    report.skipped_young = skipped_young;

    log::info!(
        "Batch finished in {:?}: {} record(s), {} failure(s), {} skipped",
        started.elapsed(),
        report.records.len(),
        report.failures.len(),
        report.skipped_young.len()
    );
    report
}

enum JobOutcome {
    Done(PathBuf, SessionMetadataRecord),
    Failed(BatchFailure),
}

/// Run `job` over `sessions` on `workers` threads, each call bounded by `timeout`
pub(crate) fn run_pool<F>(
    sessions: Vec<PathBuf>,
    workers: usize,
    timeout: Duration,
    job: F,
) -> BatchReport
where
    F: Fn(&Path) -> Result<SessionMetadataRecord, ReconcileError> + Send + Sync + 'static,
{
    let queue = Arc::new(Mutex::new(VecDeque::from(sessions)));
    let job = Arc::new(job);
    let (tx, rx) = mpsc::channel::<JobOutcome>();

    let handles: Vec<_> = (0..workers.max(1))
        .map(|worker| {
            let queue = Arc::clone(&queue);
            let job = Arc::clone(&job);
            let tx = tx.clone();
            thread::spawn(move || loop {
                let next = match queue.lock() {
                    Ok(mut guard) => guard.pop_front(),
                    Err(_) => None,
                };
                let Some(dir) = next else {
                    break;
                };
                log::debug!("Worker {} picked up {:?}", worker, dir);
                let outcome = run_with_timeout(&dir, Arc::clone(&job), timeout);
                if tx.send(outcome).is_err() {
                    break;
                }
            })
        })
        .collect();
    drop(tx);

    let mut done = Vec::new();
    let mut failures = Vec::new();
    for outcome in rx {
        match outcome {
            JobOutcome::Done(dir, record) => {
                warn_if_id_differs_from_folder(&dir, &record.session_id);
                done.push((dir, record));
            }
            JobOutcome::Failed(failure) => failures.push(failure),
        }
    }
    for handle in handles {
        let _ = handle.join();
    }

    let (records, duplicates) = reject_duplicate_ids(done);
    failures.extend(duplicates);
    for failure in &failures {
        log::error!(
            "Session {:?} failed ({:?}): {}",
            failure.session_dir,
            failure.kind,
            failure.message
        );
    }

    let mut report = BatchReport {
        records,
        failures,
        ..BatchReport::default()
    };

    report
        .records
        .sort_by(|a, b| a.session_id.cmp(&b.session_id));
    report
        .failures
        .sort_by(|a, b| a.session_dir.cmp(&b.session_dir));
    report
}

fn run_with_timeout<F>(dir: &Path, job: Arc<F>, timeout: Duration) -> JobOutcome
where
    F: Fn(&Path) -> Result<SessionMetadataRecord, ReconcileError> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel();
    let job_dir = dir.to_path_buf();
    // Detached: an overrunning job keeps its thread but its result is dropped
    thread::spawn(move || {
        let _ = tx.send((*job)(&job_dir));
    });

    let failure = |kind: FailureKind, message: String| {
        JobOutcome::Failed(BatchFailure {
            session_dir: dir.to_path_buf(),
            kind,
            message,
        })
    };

    match rx.recv_timeout(timeout) {
        Ok(Ok(record)) => JobOutcome::Done(dir.to_path_buf(), record),
        Ok(Err(e)) => failure(FailureKind::Fatal, e.to_string()),
        Err(RecvTimeoutError::Timeout) => failure(
            FailureKind::TimedOut,
            format!("no result after {:?}", timeout),
        ),
        Err(RecvTimeoutError::Disconnected) => failure(
            FailureKind::Panicked,
            "extraction thread exited without a result".to_string(),
        ),
    }
}

fn warn_if_id_differs_from_folder(dir: &Path, session_id: &str) {
    let folder = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if !folder.eq_ignore_ascii_case(session_id) {
        log::warn!(
            "Session id {:?} does not match folder name {:?} in {:?}",
            session_id,
            folder,
            dir
        );
    }
}

/// Records whose session id is claimed by more than one folder are turned
/// into failures; none of them is kept, since any could own the id.
fn reject_duplicate_ids(
    done: Vec<(PathBuf, SessionMetadataRecord)>,
) -> (Vec<SessionMetadataRecord>, Vec<BatchFailure>) {
    let mut claims: HashMap<String, usize> = HashMap::new();
    for (_, record) in &done {
        *claims.entry(record.session_id.clone()).or_default() += 1;
    }

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (dir, record) in done {
        let count = claims.get(&record.session_id).copied().unwrap_or(0);
        if count > 1 {
            failures.push(BatchFailure {
                session_dir: dir,
                kind: FailureKind::DuplicateSessionId,
                message: format!(
                    "session id {} is shared by {} folders",
                    record.session_id, count
                ),
            });
        } else {
            records.push(record);
        }
    }
    (records, failures)
}
