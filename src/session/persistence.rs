//! Durable save/restore of the editor buffer
//!
//! The whole buffer is stored under a single fixed key. Changes are written
//! after a quiet period; an explicit save writes immediately. Storage
//! failures are logged and otherwise ignored so editing never stops.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::common::{config::EditorConfig, paths};

/// Key the editor buffer is stored under
pub const BUFFER_KEY: &str = "microscript.editor";

/// Key/value storage for raw text
pub trait BufferStore: Send + Sync {
    fn load(&self, key: &str) -> io::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in the configured directory, or the platform data dir
    pub fn from_config(config: &EditorConfig) -> Option<Self> {
        config
            .storage_dir
            .clone()
            .or_else(paths::storage_dir)
            .map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl BufferStore for FileStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a truncated buffer
        let tmp = self.dir.join(format!(".{}.tmp", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path(key))
    }
}

/// In-memory storage; also stands in when no durable location exists
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    disabled: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every operation, like disabled browser storage
    pub fn disabled() -> Self {
        let store = Self::default();
        store.disabled.store(true, Ordering::SeqCst);
        store
    }

    /// Number of successful saves
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn check(&self) -> io::Result<()> {
        if self.disabled.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "storage disabled"))
        } else {
            Ok(())
        }
    }
}

impl BufferStore for MemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        self.check()?;
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        self.check()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A scheduled write that has not happened yet
struct PendingWrite {
    text: Arc<str>,
    revision: u64,
    task: JoinHandle<()>,
}

/// Serializes writes to the store
///
/// Aborting a debounce task cannot interrupt a write already in progress,
/// so every write carries a revision and an older one never lands after a
/// newer one.
struct Writer {
    store: Arc<dyn BufferStore>,
    written: Mutex<u64>,
}

impl Writer {
    fn write(&self, revision: u64, text: &str) -> bool {
        let mut written = self.written.lock();
        if *written > revision {
            tracing::trace!(revision, latest = *written, "skipping superseded save");
            return false;
        }
        *written = revision;

        match self.store.save(BUFFER_KEY, text) {
            Ok(()) => {
                tracing::debug!(bytes = text.len(), "editor buffer saved");
                true
            }
            Err(e) => {
                tracing::warn!("Could not save editor buffer: {}", e);
                false
            }
        }
    }
}

/// Debounced persistence of the editor buffer
///
/// A still-pending edit is written out when the adapter is dropped.
pub struct PersistenceAdapter {
    writer: Arc<Writer>,
    debounce: Duration,
    revision: AtomicU64,
    pending: Mutex<Option<PendingWrite>>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn BufferStore>, debounce: Duration) -> Self {
        Self {
            writer: Arc::new(Writer {
                store,
                written: Mutex::new(0),
            }),
            debounce,
            revision: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    /// The saved buffer if there is a non-empty one, otherwise `sample`
    pub fn restore(&self, sample: &str) -> String {
        match self.writer.store.load(BUFFER_KEY) {
            Ok(Some(saved)) if !saved.is_empty() => {
                tracing::debug!(bytes = saved.len(), "restored editor buffer");
                saved
            }
            Ok(_) => sample.to_string(),
            Err(e) => {
                tracing::warn!("Could not read saved editor buffer: {}", e);
                sample.to_string()
            }
        }
    }

    /// Schedule a write of `text` once edits pause for the debounce period
    ///
    /// Must be called from within a Tokio runtime.
    pub fn buffer_changed<S: Into<Arc<str>>>(&self, text: S) {
        let text: Arc<str> = text.into();
        let revision = self.next_revision();
        let writer = Arc::clone(&self.writer);
        let delay = self.debounce;
        let scheduled = Arc::clone(&text);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let write = tokio::task::spawn_blocking(move || writer.write(revision, &scheduled));
            if let Err(e) = write.await {
                tracing::warn!("Editor buffer save task failed: {}", e);
            }
        });

        let replaced = self.pending.lock().replace(PendingWrite {
            text,
            revision,
            task,
        });
        if let Some(previous) = replaced {
            previous.task.abort();
        }
    }

    /// Write immediately, cancelling any scheduled write
    pub fn save_now(&self, text: &str) -> bool {
        self.cancel_pending();
        let revision = self.next_revision();
        self.writer.write(revision, text)
    }

    /// Write a scheduled buffer right away, if one is still waiting
    pub fn flush(&self) -> bool {
        let Some(pending) = self.pending.lock().take() else {
            return false;
        };
        if pending.task.is_finished() {
            return false;
        }
        pending.task.abort();
        self.writer.write(pending.revision, &pending.text)
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|p| !p.task.is_finished())
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cancel_pending(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.task.abort();
        }
    }
}

impl Drop for PersistenceAdapter {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const SAMPLE: &str = "x = 10\nprint(x)";

    fn adapter(store: &Arc<MemoryStore>, debounce_ms: u64) -> PersistenceAdapter {
        PersistenceAdapter::new(store.clone(), Duration::from_millis(debounce_ms))
    }

    #[tokio::test]
    async fn test_burst_of_edits_writes_once() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 40);

        persistence.buffer_changed("x");
        persistence.buffer_changed("x =");
        persistence.buffer_changed("x = 1");
        assert_eq!(store.writes(), 0);
        assert!(persistence.has_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("x = 1"));
        assert!(!persistence.has_pending());
    }

    #[tokio::test]
    async fn test_save_now_bypasses_debounce() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 40);

        persistence.buffer_changed("draft");
        assert!(persistence.save_now("final"));
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("final"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("final"));
    }

    #[tokio::test]
    async fn test_flush_writes_pending_text() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 10_000);

        persistence.buffer_changed("pending");
        assert!(persistence.flush());
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("pending"));
        assert!(!persistence.flush());
    }

    #[tokio::test]
    async fn test_drop_writes_pending_edit() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 10_000);

        persistence.buffer_changed("unsaved");
        drop(persistence);
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("unsaved"));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_superseded_write_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 10_000);

        persistence.buffer_changed("draft");
        let draft = persistence.pending.lock().as_ref().map(|p| p.revision).unwrap();
        assert!(persistence.save_now("final"));

        // A debounced write that was already running when it got cancelled
        assert!(!persistence.writer.write(draft, "draft"));
        assert_eq!(store.get(BUFFER_KEY).as_deref(), Some("final"));
        assert_eq!(store.writes(), 1);
    }

    /// Blocks inside its first save until released
    struct GatedStore {
        inner: MemoryStore,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl BufferStore for GatedStore {
        fn load(&self, key: &str) -> io::Result<Option<String>> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, value: &str) -> io::Result<()> {
            let entered = self.entered.lock().take();
            if let Some(entered) = entered {
                let _ = entered.send(());
                let release = self.release.lock().take();
                if let Some(release) = release {
                    let _ = release.recv();
                }
            }
            self.inner.save(key, value)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_save_now_waits_for_write_in_progress() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let persistence = Arc::new(PersistenceAdapter::new(store.clone(), Duration::from_millis(5)));

        persistence.buffer_changed("draft");
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // The debounced write is inside the store; aborting cannot stop it
        let saver = std::thread::spawn({
            let persistence = persistence.clone();
            move || persistence.save_now("final")
        });
        release_tx.send(()).unwrap();

        assert!(saver.join().unwrap());
        assert_eq!(store.inner.get(BUFFER_KEY).as_deref(), Some("final"));
        assert_eq!(store.inner.writes(), 2);
    }

    #[test]
    fn test_restore_prefers_saved_buffer() {
        let store = Arc::new(MemoryStore::new());
        let persistence = adapter(&store, 10);
        assert_eq!(persistence.restore(SAMPLE), SAMPLE);

        store.save(BUFFER_KEY, "").unwrap();
        assert_eq!(persistence.restore(SAMPLE), SAMPLE);

        store.save(BUFFER_KEY, "print(42)").unwrap();
        assert_eq!(persistence.restore(SAMPLE), "print(42)");
    }

    #[tokio::test]
    async fn test_disabled_storage_degrades_silently() {
        let store = Arc::new(MemoryStore::disabled());
        let persistence = adapter(&store, 5);

        assert_eq!(persistence.restore(SAMPLE), SAMPLE);
        assert!(!persistence.save_now("x"));
        persistence.buffer_changed("y");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.load(BUFFER_KEY).unwrap(), None);
        store.save(BUFFER_KEY, "y = 2\n").unwrap();
        assert_eq!(store.load(BUFFER_KEY).unwrap().as_deref(), Some("y = 2\n"));
        assert!(dir.path().join("nested").join(BUFFER_KEY).exists());
    }
}
