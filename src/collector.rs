//! Parallel production of raw entries.
//!
//! Every input file becomes one task on the tokio runtime. Plain files are
//! compressed and nested archives are walked on the blocking pool, since both
//! make synchronous file reads. Each nested member is inserted on its own. A semaphore bounds how many
//! tasks do work at once. The only shared state is the [`EntryTable`], and
//! nothing is visible to the caller until every task has finished.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::runtime::Handle;
use tokio::task::{self, JoinSet};

use crate::compressor::{DEFAULT_LEVEL, EntryCompressor};
use crate::entry::RawEntry;
use crate::error::{Error, InputFailure, Result};
use crate::zip::extract_nested_archive;

/// How an input file is turned into entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Compressed fresh into a single entry.
    Plain,
    /// A ZIP archive whose members are passed through.
    NestedArchive,
}

/// One file handed over by the input enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Name inside the output archive. Unused for nested archives, whose
    /// members keep their own names.
    pub archive_path: String,
    pub kind: InputKind,
}

impl InputFile {
    pub fn plain(path: impl Into<PathBuf>, archive_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            archive_path: archive_path.into(),
            kind: InputKind::Plain,
        }
    }

    pub fn nested(path: impl Into<PathBuf>, archive_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            archive_path: archive_path.into(),
            kind: InputKind::NestedArchive,
        }
    }
}

/// Which candidate survives when two entries share an archive path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Whichever insertion completes last. Not deterministic across runs.
    #[default]
    LastWins,
    /// The entry from the earliest submitted input, then the earliest member.
    FirstListed,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum number of inputs processed at once.
    pub jobs: usize,
    /// DEFLATE level for freshly compressed files.
    pub level: u32,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            level: DEFAULT_LEVEL,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// Submission order of the input, then member index within it.
type Rank = (usize, usize);

#[derive(Default)]
struct TableState {
    entries: HashMap<String, (Rank, RawEntry)>,
    duplicates: Vec<String>,
}

/// Entries keyed by archive path, safe to insert into from many tasks.
pub struct EntryTable {
    policy: DuplicatePolicy,
    state: Mutex<TableState>,
}

impl EntryTable {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(TableState::default()),
        }
    }

    /// Insert an entry, resolving a path collision with the table's policy.
    ///
    /// Returns `true` when the path was already present.
    pub fn insert(&self, rank: (usize, usize), entry: RawEntry) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let path = entry.archive_path().to_string();

        match state.entries.entry(path.clone()) {
            Entry::Vacant(slot) => {
                slot.insert((rank, entry));
                false
            }
            Entry::Occupied(mut slot) => {
                let replace = match self.policy {
                    DuplicatePolicy::LastWins => true,
                    DuplicatePolicy::FirstListed => rank < slot.get().0,
                };
                if replace {
                    slot.insert((rank, entry));
                }
                warn!("{}", Error::DuplicatePath { path: path.clone() });
                state.duplicates.push(path);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, archive_path: &str) -> bool {
        self.lock().entries.contains_key(archive_path)
    }

    /// Archive paths that were inserted more than once, one item per collision.
    pub fn duplicates(&self) -> Vec<String> {
        self.lock().duplicates.clone()
    }

    /// Consume the table, ordering entries by archive path bytes.
    pub fn into_sorted(self) -> Vec<RawEntry> {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<RawEntry> = state.entries.into_values().map(|(_, e)| e).collect();
        entries.sort_by(|a, b| a.archive_path().cmp(b.archive_path()));
        entries
    }

    fn take(&self) -> Self {
        let state = std::mem::take(&mut *self.lock());
        Self {
            policy: self.policy,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the producers left behind once the barrier has passed.
pub struct CollectOutcome {
    pub table: EntryTable,
    /// Failed inputs, sorted by path.
    pub failures: Vec<InputFailure>,
}

impl CollectOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// All or nothing: the table only if every input succeeded.
    pub fn into_result(self) -> Result<EntryTable> {
        if self.failures.is_empty() {
            Ok(self.table)
        } else {
            Err(Error::BatchFailed(self.failures))
        }
    }
}

/// Run one production task per input to completion and gather the results.
///
/// A failing input never cancels its siblings; it is reported in
/// [`CollectOutcome::failures`].
pub async fn collect(inputs: Vec<InputFile>, config: &CollectorConfig) -> CollectOutcome {
    let table = Arc::new(EntryTable::new(config.duplicate_policy));
    let permits = Arc::new(Semaphore::new(config.jobs.max(1)));
    let compressor = EntryCompressor::new(config.level);
    let mut tasks = JoinSet::new();
    let mut task_paths = HashMap::new();

    debug!("collecting {} inputs with {} workers", inputs.len(), config.jobs.max(1));

    for (order, input) in inputs.into_iter().enumerate() {
        let table = Arc::clone(&table);
        let permits = Arc::clone(&permits);
        let path = input.path.clone();
        let handle = tasks.spawn(async move {
            // never closed, so this only waits for a free slot
            let _permit = permits.acquire_owned().await.ok();
            let result = produce(order, &input, compressor, table).await;
            (input.path, result)
        });
        task_paths.insert(handle.id(), path);
    }

    let failures = drain(tasks, task_paths).await;

    // every task has been joined, so this is the last reference
    let table = Arc::try_unwrap(table).unwrap_or_else(|shared| shared.take());
    CollectOutcome { table, failures }
}

type TaskOutput = (PathBuf, Result<usize>);

/// Join every task, naming each failure after its input even when the task panicked.
async fn drain(
    mut tasks: JoinSet<TaskOutput>,
    mut task_paths: HashMap<task::Id, PathBuf>,
) -> Vec<InputFailure> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, (path, Ok(count)))) => debug!("{}: {} entries", path.display(), count),
            Ok((_, (path, Err(error)))) => failures.push(InputFailure { path, error }),
            Err(err) => {
                let path = task_paths.remove(&err.id()).unwrap_or_default();
                failures.push(InputFailure {
                    error: worker_failure(&path, err),
                    path,
                });
            }
        }
    }
    failures.sort_by(|a, b| a.path.cmp(&b.path));
    failures
}

fn worker_failure(path: &Path, err: task::JoinError) -> Error {
    Error::Worker {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

async fn produce(
    order: usize,
    input: &InputFile,
    compressor: EntryCompressor,
    table: Arc<EntryTable>,
) -> Result<usize> {
    let worker_error = |err| worker_failure(&input.path, err);

    match input.kind {
        InputKind::Plain => {
            let path = input.path.clone();
            let name = input.archive_path.clone();
            let entry = task::spawn_blocking(move || compressor.compress_file(&path, name))
                .await
                .map_err(worker_error)??;
            table.insert((order, 0), entry);
            Ok(1)
        }
        InputKind::NestedArchive => {
            let path = input.path.clone();
            let runtime = Handle::current();
            let entries =
                task::spawn_blocking(move || runtime.block_on(extract_nested_archive(&path)))
                    .await
                    .map_err(worker_error)??;
            let count = entries.len();
            for (index, entry) in entries.into_iter().enumerate() {
                table.insert((order, index), entry);
            }
            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{CompressionMethod, DosDateTime};

    fn entry(path: &str, body: &[u8]) -> RawEntry {
        RawEntry::new(
            path.to_string(),
            CompressionMethod::Stored,
            crc32fast::hash(body),
            body.len() as u64,
            body.to_vec(),
            DosDateTime::MIN,
        )
        .unwrap()
    }

    #[test]
    fn last_wins_keeps_latest_insertion() {
        let table = EntryTable::new(DuplicatePolicy::LastWins);
        assert!(!table.insert((1, 0), entry("a", b"one")));
        assert!(table.insert((0, 0), entry("a", b"two")));
        let entries = table.into_sorted();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].compressed_bytes(), b"two");
    }

    #[test]
    fn first_listed_keeps_lowest_rank() {
        let table = EntryTable::new(DuplicatePolicy::FirstListed);
        table.insert((2, 0), entry("a", b"late"));
        table.insert((0, 3), entry("a", b"early"));
        table.insert((0, 4), entry("a", b"later member"));
        assert_eq!(table.duplicates(), vec!["a".to_string(), "a".to_string()]);
        let entries = table.into_sorted();
        assert_eq!(entries[0].compressed_bytes(), b"early");
    }

    #[test]
    fn sorted_by_path_bytes() {
        let table = EntryTable::new(DuplicatePolicy::default());
        for path in ["b", "a/z", "B", "a"] {
            table.insert((0, 0), entry(path, b""));
        }
        let paths: Vec<_> = table
            .into_sorted()
            .iter()
            .map(|e| e.archive_path().to_string())
            .collect();
        assert_eq!(paths, ["B", "a", "a/z", "b"]);
    }

    #[tokio::test]
    async fn panicked_task_is_reported_against_its_input() {
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut task_paths = HashMap::new();

        let ok = tasks.spawn(async { (PathBuf::from("/in/ok.txt"), Ok(1)) });
        task_paths.insert(ok.id(), PathBuf::from("/in/ok.txt"));
        let crashed = tasks.spawn(async {
            if true {
                panic!("worker crashed");
            }
            (PathBuf::new(), Ok(0))
        });
        task_paths.insert(crashed.id(), PathBuf::from("/in/crash.txt"));

        let failures = drain(tasks, task_paths).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, PathBuf::from("/in/crash.txt"));
        match &failures[0].error {
            Error::Worker { path, reason } => {
                assert_eq!(path, &PathBuf::from("/in/crash.txt"));
                assert!(reason.contains("panicked"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
