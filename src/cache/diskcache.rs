//! Size-bounded, key-addressed file store.
//!
//! Layout: `<dir>/diskCache/<key>` holds a committed entry and
//! `<dir>/diskCache/<key>.tmp` an in-progress write. Metadata lives in one
//! index behind a single lock; stream I/O runs without it.
//!
//! Every entry follows one lifecycle:
//!
//! ```text
//! Idle --open_reader--> Reading(n) --last close--> Idle
//! Idle | Reading(n) --open_writer--> Writing{readers}
//! Writing{0} --close--> Idle (tmp replaces the committed file)
//! Writing{n>0} --close--> Committed{n} --last reader closes--> Idle (same)
//! any --require_delete--> removed once Idle
//! ```
//!
//! Eviction runs on a dedicated thread, removes idle entries in least
//! recently used order and skips entries in use, so the size bound is a
//! soft target while entries are busy.

use crate::base::context::{IoResultExt, MutexExt};
use crate::base::neterror::NetError;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::thread;

const CACHE_DIR: &str = "diskCache";
const DIRTY_SUFFIX: &str = ".tmp";

static LEGAL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]{1,64}$").expect("key pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Reading(usize),
    Writing { readers: usize, failed: bool },
    Committed { readers: usize, failed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    OpenRead,
    CloseRead,
    OpenWrite,
    WriteFailed,
    CloseWrite,
    RequireDelete,
}

/// What the cache must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    None,
    /// Replace the committed file with the temporary one (or drop it).
    Finalize { success: bool },
    /// Remove the entry and its committed file.
    Delete,
    /// The event is not allowed in the current phase.
    Refuse,
}

#[derive(Debug, Clone)]
struct EntryState {
    phase: Phase,
    pending_delete: bool,
    /// A committed file exists for this entry.
    stored: bool,
    /// Size of the committed file, counted in `Index::size`.
    len: u64,
    last_access: u64,
}

impl EntryState {
    fn new(len: u64, last_access: u64) -> Self {
        Self {
            phase: Phase::Idle,
            pending_delete: false,
            stored: false,
            len,
            last_access,
        }
    }

    fn in_use(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// The single transition function for both stream close paths.
    fn apply(&mut self, event: Event) -> Action {
        use Phase::*;
        let (next, action) = match (self.phase, event) {
            (Idle, Event::OpenRead) => (Reading(1), Action::None),
            (Reading(n), Event::OpenRead) => (Reading(n + 1), Action::None),
            (Writing { readers, failed }, Event::OpenRead) => (
                Writing {
                    readers: readers + 1,
                    failed,
                },
                Action::None,
            ),
            (Committed { readers, failed }, Event::OpenRead) => (
                Committed {
                    readers: readers + 1,
                    failed,
                },
                Action::None,
            ),

            (Reading(1), Event::CloseRead) => (Idle, self.delete_if_pending()),
            (Reading(n), Event::CloseRead) if n > 1 => (Reading(n - 1), Action::None),
            (Writing { readers, failed }, Event::CloseRead) if readers > 0 => (
                Writing {
                    readers: readers - 1,
                    failed,
                },
                Action::None,
            ),
            (Committed { readers: 1, failed }, Event::CloseRead) => {
                (Idle, Action::Finalize { success: !failed })
            }
            (Committed { readers, failed }, Event::CloseRead) if readers > 1 => (
                Committed {
                    readers: readers - 1,
                    failed,
                },
                Action::None,
            ),

            (Idle, Event::OpenWrite) => (
                Writing {
                    readers: 0,
                    failed: false,
                },
                Action::None,
            ),
            (Reading(n), Event::OpenWrite) => (
                Writing {
                    readers: n,
                    failed: false,
                },
                Action::None,
            ),

            (Writing { readers, .. }, Event::WriteFailed) => (
                Writing {
                    readers,
                    failed: true,
                },
                Action::None,
            ),

            (Writing { readers: 0, failed }, Event::CloseWrite) => {
                (Idle, Action::Finalize { success: !failed })
            }
            (Writing { readers, failed }, Event::CloseWrite) => {
                (Committed { readers, failed }, Action::None)
            }

            (phase, Event::RequireDelete) => {
                self.pending_delete = true;
                (
                    phase,
                    if phase == Idle {
                        Action::Delete
                    } else {
                        Action::None
                    },
                )
            }

            (phase, _) => (phase, Action::Refuse),
        };
        self.phase = next;
        action
    }

    fn delete_if_pending(&self) -> Action {
        if self.pending_delete {
            Action::Delete
        } else {
            Action::None
        }
    }
}

struct Index {
    entries: HashMap<String, EntryState>,
    size: u64,
    tick: u64,
}

impl Index {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn state(&mut self, key: &str) -> &mut EntryState {
        let Index { entries, tick, .. } = self;
        entries.entry(key.to_string()).or_insert_with(|| {
            *tick += 1;
            EntryState::new(0, *tick)
        })
    }

    /// Drop the record of an idle entry that never got a committed file.
    fn forget_if_unused(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|s| s.phase == Phase::Idle && !s.stored)
        {
            self.entries.remove(key);
        }
    }
}

struct Shared {
    directory: PathBuf,
    max_size: u64,
    index: Mutex<Index>,
    trim_pending: AtomicBool,
    trimmer: Sender<()>,
}

impl Shared {
    fn clean_file(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }

    fn dirty_file(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}{}", key, DIRTY_SUFFIX))
    }

    /// Apply `event` to `key` and carry out the resulting action.
    fn transition(&self, key: &str, event: Event) -> Action {
        let mut index = self.index.locked();
        let action = index.state(key).apply(event);
        self.perform(&mut index, key, action);
        index.forget_if_unused(key);
        action
    }

    fn perform(&self, index: &mut Index, key: &str, action: Action) {
        match action {
            Action::None | Action::Refuse => {}
            Action::Finalize { success } => {
                self.finalize_write(index, key, success);
                let pending = index.entries.get(key).is_some_and(|s| s.pending_delete);
                if pending {
                    self.delete_entry(index, key);
                }
                self.schedule_trim(index);
            }
            Action::Delete => self.delete_entry(index, key),
        }
    }

    fn finalize_write(&self, index: &mut Index, key: &str, success: bool) {
        let dirty = self.dirty_file(key);
        if !success {
            if let Err(e) = remove_if_exists(&dirty) {
                tracing::warn!(key, error = %e, "Failed to discard partial cache write");
            }
            return;
        }
        let committed = fs::metadata(&dirty)
            .map(|m| m.len())
            .and_then(|len| fs::rename(&dirty, self.clean_file(key)).map(|_| len));
        match committed {
            Ok(new_len) => {
                let state = index.state(key);
                state.stored = true;
                let old_len = std::mem::replace(&mut state.len, new_len);
                index.size = index.size - old_len + new_len;
                tracing::debug!(key, bytes = new_len, total = index.size, "Committed cache entry");
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to commit cache entry");
                let _ = remove_if_exists(&dirty);
                index.state(key).pending_delete = true;
            }
        }
    }

    fn delete_entry(&self, index: &mut Index, key: &str) {
        let Some(state) = index.entries.remove(key) else {
            return;
        };
        if let Err(e) = remove_if_exists(&self.clean_file(key)) {
            tracing::warn!(key, error = %e, "Failed to delete cache entry");
        }
        index.size -= state.len;
        tracing::debug!(key, bytes = state.len, total = index.size, "Deleted cache entry");
    }

    /// Queue one eviction pass if the index is over budget.
    fn schedule_trim(&self, index: &Index) {
        if index.size > self.max_size && !self.trim_pending.swap(true, Ordering::SeqCst) {
            let _ = self.trimmer.send(());
        }
    }

    /// Evict idle entries, least recently used first, until within budget.
    fn trim(&self) {
        let mut index = self.index.locked();
        if index.size <= self.max_size {
            return;
        }
        let mut candidates: Vec<(u64, String)> = index
            .entries
            .iter()
            .filter(|(_, state)| !state.in_use())
            .map(|(key, state)| (state.last_access, key.clone()))
            .collect();
        candidates.sort_unstable();

        let mut evicted = 0usize;
        for (_, key) in candidates {
            if index.size <= self.max_size {
                break;
            }
            self.delete_entry(&mut index, &key);
            evicted += 1;
        }
        tracing::debug!(
            evicted,
            total = index.size,
            max = self.max_size,
            "Cache trim finished"
        );
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn spawn_trimmer(shared: Weak<Shared>, jobs: mpsc::Receiver<()>) -> io::Result<()> {
    thread::Builder::new()
        .name("netpipe-cache-trim".to_string())
        .spawn(move || {
            while jobs.recv().is_ok() {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.trim_pending.store(false, Ordering::SeqCst);
                shared.trim();
            }
        })
        .map(|_| ())
}

/// A persistent cache shared by all calls of a client.
#[derive(Clone)]
pub struct DiskCache {
    shared: Arc<Shared>,
}

impl DiskCache {
    /// Open (creating if needed) the cache under `directory/diskCache`.
    ///
    /// Leftover temporary files are deleted and the index is rebuilt from
    /// the committed files, oldest modification first.
    pub fn open(directory: impl AsRef<Path>, max_size: u64) -> Result<Self, NetError> {
        if max_size == 0 {
            return Err(NetError::InvalidConfig("cache max size must be positive".into()));
        }
        let directory = directory.as_ref();
        if directory.is_file() {
            return Err(NetError::InvalidConfig(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        let dir = directory.join(CACHE_DIR);
        fs::create_dir_all(&dir).cache_context(CACHE_DIR)?;

        let mut files = Vec::new();
        for item in fs::read_dir(&dir).cache_context(CACHE_DIR)? {
            let item = item.cache_context(CACHE_DIR)?;
            let meta = item.metadata().cache_context(CACHE_DIR)?;
            if !meta.is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if name.ends_with(DIRTY_SUFFIX) {
                fs::remove_file(item.path()).cache_context(&name)?;
                continue;
            }
            let modified = meta.modified().ok();
            files.push((modified, name, meta.len()));
        }
        files.sort();

        let mut index = Index {
            entries: HashMap::with_capacity(files.len()),
            size: 0,
            tick: 0,
        };
        for (_, name, len) in files {
            let tick = index.next_tick();
            index.size += len;
            let mut state = EntryState::new(len, tick);
            state.stored = true;
            index.entries.insert(name, state);
        }
        tracing::debug!(
            dir = %dir.display(),
            entries = index.entries.len(),
            bytes = index.size,
            "Opened disk cache"
        );

        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            directory: dir,
            max_size,
            index: Mutex::new(index),
            trim_pending: AtomicBool::new(false),
            trimmer: tx,
        });
        spawn_trimmer(Arc::downgrade(&shared), rx).cache_context(CACHE_DIR)?;

        {
            let index = shared.index.locked();
            shared.schedule_trim(&index);
        }
        Ok(Self { shared })
    }

    /// A handle for `key`. The index only records the key once it is
    /// opened for reading or writing.
    pub fn entry(&self, key: &str) -> Result<Entry, NetError> {
        if !LEGAL_KEY.is_match(key) {
            return Err(NetError::InvalidCacheKey(key.to_string()));
        }
        let mut index = self.shared.index.locked();
        if index.entries.contains_key(key) {
            let tick = index.next_tick();
            if let Some(state) = index.entries.get_mut(key) {
                state.last_access = tick;
            }
        }
        Ok(Entry {
            shared: self.shared.clone(),
            key: key.to_string(),
        })
    }

    /// Tracked size of all committed entries in bytes.
    pub fn size(&self) -> u64 {
        self.shared.index.locked().size
    }

    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    /// The `diskCache` directory holding the entry files.
    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.shared.index.locked().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one cache entry.
pub struct Entry {
    shared: Arc<Shared>,
    key: String,
}

impl Entry {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Size of the committed file, 0 when nothing is committed.
    pub fn len(&self) -> u64 {
        self.shared
            .index
            .locked()
            .entries
            .get(&self.key)
            .map_or(0, |s| s.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open the committed file for reading. `None` when nothing is
    /// committed.
    pub fn open_reader(&self) -> Result<Option<EntryReader>, NetError> {
        let mut index = self.shared.index.locked();
        let file = match File::open(self.shared.clean_file(&self.key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).cache_context(&self.key),
        };
        index.state(&self.key).apply(Event::OpenRead);
        Ok(Some(EntryReader {
            shared: self.shared.clone(),
            key: self.key.clone(),
            file,
        }))
    }

    /// Start a write to the temporary file. `None` while another write to
    /// this entry is in progress.
    pub fn open_writer(&self) -> Result<Option<EntryWriter>, NetError> {
        let mut index = self.shared.index.locked();
        let busy = index.entries.get(&self.key).is_some_and(|s| {
            matches!(s.phase, Phase::Writing { .. } | Phase::Committed { .. })
        });
        if busy {
            return Ok(None);
        }
        let file = File::create(self.shared.dirty_file(&self.key)).cache_context(&self.key)?;
        if index.state(&self.key).apply(Event::OpenWrite) == Action::Refuse {
            return Ok(None);
        }
        Ok(Some(EntryWriter {
            shared: self.shared.clone(),
            key: self.key.clone(),
            file,
            aborted: false,
        }))
    }

    /// Remove the entry now if it is idle, otherwise once it becomes idle.
    pub fn require_delete(&self) {
        self.shared.transition(&self.key, Event::RequireDelete);
    }
}

/// Reads a committed entry. Dropping it releases the read.
pub struct EntryReader {
    shared: Arc<Shared>,
    key: String,
    file: File,
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).inspect_err(|e| {
            tracing::warn!(key = %self.key, error = %e, "Cache read failed");
            self.shared.transition(&self.key, Event::RequireDelete);
        })
    }
}

impl Drop for EntryReader {
    fn drop(&mut self) {
        self.shared.transition(&self.key, Event::CloseRead);
    }
}

/// Writes a new version of an entry. Dropping it commits the write; the
/// new version becomes visible once no reader holds the old one. Use
/// [`EntryWriter::abort`] to discard it and keep the committed version.
pub struct EntryWriter {
    shared: Arc<Shared>,
    key: String,
    file: File,
    aborted: bool,
}

impl EntryWriter {
    /// Discard everything written so far.
    pub fn abort(mut self) {
        tracing::debug!(key = %self.key, "Cache write aborted");
        self.aborted = true;
        self.shared.transition(&self.key, Event::WriteFailed);
    }

    fn fail(&self, e: &io::Error) {
        tracing::warn!(key = %self.key, error = %e, "Cache write failed");
        self.shared.transition(&self.key, Event::WriteFailed);
        self.shared.transition(&self.key, Event::RequireDelete);
    }
}

impl Write for EntryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.file.write(buf);
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.file.flush();
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }
}

impl Drop for EntryWriter {
    fn drop(&mut self) {
        if !self.aborted {
            if let Err(e) = self.file.sync_data() {
                self.fail(&e);
            }
        }
        self.shared.transition(&self.key, Event::CloseWrite);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> EntryState {
        EntryState::new(0, 0)
    }

    #[test]
    fn test_read_then_close_returns_to_idle() {
        let mut s = state();
        assert_eq!(s.apply(Event::OpenRead), Action::None);
        assert_eq!(s.apply(Event::OpenRead), Action::None);
        assert_eq!(s.phase, Phase::Reading(2));
        s.apply(Event::CloseRead);
        assert_eq!(s.apply(Event::CloseRead), Action::None);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn test_single_writer() {
        let mut s = state();
        assert_eq!(s.apply(Event::OpenWrite), Action::None);
        assert_eq!(s.apply(Event::OpenWrite), Action::Refuse);
        assert_eq!(s.apply(Event::CloseWrite), Action::Finalize { success: true });
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn test_commit_deferred_until_last_reader() {
        let mut s = state();
        s.apply(Event::OpenRead);
        s.apply(Event::OpenWrite);
        s.apply(Event::OpenRead);
        assert_eq!(s.apply(Event::CloseWrite), Action::None);
        assert_eq!(s.phase, Phase::Committed { readers: 2, failed: false });
        assert_eq!(s.apply(Event::OpenWrite), Action::Refuse);
        assert_eq!(s.apply(Event::CloseRead), Action::None);
        assert_eq!(s.apply(Event::CloseRead), Action::Finalize { success: true });
    }

    #[test]
    fn test_failed_write_is_not_committed() {
        let mut s = state();
        s.apply(Event::OpenWrite);
        s.apply(Event::WriteFailed);
        assert_eq!(s.apply(Event::CloseWrite), Action::Finalize { success: false });
    }

    #[test]
    fn test_delete_waits_for_readers() {
        let mut s = state();
        s.apply(Event::OpenRead);
        assert_eq!(s.apply(Event::RequireDelete), Action::None);
        assert!(s.pending_delete);
        assert_eq!(s.apply(Event::CloseRead), Action::Delete);
    }

    #[test]
    fn test_delete_idle_is_immediate() {
        let mut s = state();
        assert_eq!(s.apply(Event::RequireDelete), Action::Delete);
    }

    #[test]
    fn test_unbalanced_close_is_refused() {
        let mut s = state();
        assert_eq!(s.apply(Event::CloseRead), Action::Refuse);
        assert_eq!(s.apply(Event::CloseWrite), Action::Refuse);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn test_key_pattern() {
        assert!(LEGAL_KEY.is_match("0123abcdef_body"));
        assert!(LEGAL_KEY.is_match("a-b"));
        assert!(!LEGAL_KEY.is_match("UPPER"));
        assert!(!LEGAL_KEY.is_match(""));
        assert!(!LEGAL_KEY.is_match(&"a".repeat(65)));
        assert!(!LEGAL_KEY.is_match("../etc"));
    }
}
