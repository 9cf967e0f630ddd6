//! File-backed thread repository.
//!
//! Each thread lives in `<base>/threads/<id>.json` as a single versioned
//! document holding the thread metadata and its messages. Every write goes
//! through a temp file in the same directory followed by a rename, so
//! readers see either the old document or the new one. Writers to the same
//! thread are serialized by a per-thread lock.

mod model;

pub use model::{Conversation, StoredMessage, Thread};

use crate::error::{GhostError, Result};
use crate::types::ChatMessage;
use chrono::{DateTime, Utc};
use model::{ThreadDocument, DOCUMENT_VERSION};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const THREADS_DIR: &str = "threads";
const DOCUMENT_EXTENSION: &str = "json";

#[derive(Clone)]
pub struct ThreadStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    threads_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadStore {
    /// Open (creating if needed) the store rooted at `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let threads_dir = base_dir.as_ref().join(THREADS_DIR);
        fs::create_dir_all(&threads_dir).map_err(|e| GhostError::storage(&threads_dir, e))?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                threads_dir,
                locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn threads_dir(&self) -> &Path {
        &self.inner.threads_dir
    }

    pub fn create_thread(&self, title: &str) -> Result<Thread> {
        let now = Utc::now();
        let thread = Thread {
            id: uuid::Uuid::new_v4().simple().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        let lock = self.lock_for(&thread.id);
        let _guard = acquire(&lock);
        self.write_document(&ThreadDocument::new(thread.clone()))?;
        debug!(thread_id = %thread.id, "created thread");
        Ok(thread)
    }

    pub fn get_thread(&self, id: &str) -> Result<Thread> {
        Ok(self.read_document(id)?.thread)
    }

    /// Persist new metadata (title) for an existing thread and bump its
    /// `updated_at`. Returns the thread as written.
    pub fn update_thread(&self, thread: &Thread) -> Result<Thread> {
        let lock = self.lock_for(&thread.id);
        let _guard = acquire(&lock);
        let mut document = self.read_document(&thread.id)?;
        document.thread.title = thread.title.clone();
        document.thread.updated_at = later_of(Utc::now(), document.thread.updated_at);
        self.write_document(&document)?;
        Ok(document.thread)
    }

    pub fn delete_thread(&self, id: &str) -> Result<()> {
        let path = self.document_path(id)?;
        {
            let lock = self.lock_for(id);
            let _guard = acquire(&lock);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(GhostError::ThreadNotFound(id.to_string()))
                }
                Err(e) => return Err(GhostError::storage(&path, e)),
            }
        }
        self.locks().remove(id);
        debug!(thread_id = %id, "deleted thread");
        Ok(())
    }

    /// All threads, most recently updated first. Unreadable documents are
    /// skipped with a warning so one bad file does not hide the rest.
    pub fn list_threads(&self) -> Result<Vec<Thread>> {
        let dir = &self.inner.threads_dir;
        let entries = fs::read_dir(dir).map_err(|e| GhostError::storage(dir, e))?;

        let mut threads = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GhostError::storage(dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            match read_document_at(&path) {
                Ok(document) => threads.push(document.thread),
                Err(GhostError::ThreadNotFound(_)) => {}
                Err(error) => warn!(path = %path.display(), %error, "skipping thread document"),
            }
        }

        threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(threads)
    }

    /// Append a message; the message and the thread's new `updated_at` land
    /// in the same atomic write.
    pub fn add_message(&self, thread_id: &str, message: &ChatMessage) -> Result<StoredMessage> {
        let lock = self.lock_for(thread_id);
        let _guard = acquire(&lock);
        let mut document = self.read_document(thread_id)?;

        let mut created_at = Utc::now();
        if let Some(last) = document.messages.last() {
            created_at = later_of(created_at, last.created_at);
        }
        let stored = StoredMessage {
            id: uuid::Uuid::new_v4().simple().to_string(),
            thread_id: thread_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            images: message.images.clone(),
            tool_calls: message.tool_calls.clone(),
            tool_call_id: message.tool_call_id.clone(),
            created_at,
        };
        document.messages.push(stored.clone());
        document.thread.updated_at = later_of(created_at, document.thread.updated_at);
        self.write_document(&document)?;
        debug!(thread_id = %thread_id, role = %message.role, "appended message");
        Ok(stored)
    }

    pub fn get_messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self.read_document(thread_id)?.messages)
    }

    pub fn get_conversation(&self, thread_id: &str) -> Result<Conversation> {
        Ok(self.read_document(thread_id)?.into_conversation())
    }

    fn document_path(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_thread_id(id) {
            return Err(GhostError::ThreadNotFound(id.to_string()));
        }
        Ok(self
            .inner
            .threads_dir
            .join(format!("{id}.{DOCUMENT_EXTENSION}")))
    }

    fn read_document(&self, id: &str) -> Result<ThreadDocument> {
        let path = self.document_path(id)?;
        let document = read_document_at(&path)?;
        if document.thread.id != id {
            return Err(GhostError::DataCorruption {
                path,
                reason: format!("document holds thread '{}'", document.thread.id),
            });
        }
        Ok(document)
    }

    fn write_document(&self, document: &ThreadDocument) -> Result<()> {
        let path = self.document_path(&document.thread.id)?;
        let dir = &self.inner.threads_dir;
        let encoded = serde_json::to_vec_pretty(document).map_err(|e| {
            GhostError::DataCorruption {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| GhostError::storage(dir, e))?;
        tmp.write_all(&encoded)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| GhostError::storage(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| GhostError::storage(&path, e.error))?;
        Ok(())
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks().entry(id.to_string()).or_default())
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        acquire(&self.inner.locks)
    }
}

fn read_document_at(path: &Path) -> Result<ThreadDocument> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(GhostError::ThreadNotFound(id));
        }
        Err(e) => return Err(GhostError::storage(path, e)),
    };

    let document: ThreadDocument =
        serde_json::from_slice(&bytes).map_err(|e| GhostError::DataCorruption {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if document.version > DOCUMENT_VERSION {
        return Err(GhostError::DataCorruption {
            path: path.to_path_buf(),
            reason: format!("unsupported document version {}", document.version),
        });
    }
    Ok(document)
}

fn acquire<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn later_of(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    a.max(b)
}

fn is_valid_thread_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolCall};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_get_thread() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");

        let thread = store.create_thread("Hi").expect("create");
        assert_eq!(thread.created_at, thread.updated_at);
        assert!(store.threads_dir().join(format!("{}.json", thread.id)).exists());
        assert_eq!(store.get_thread(&thread.id).expect("get"), thread);
    }

    #[test]
    fn test_missing_thread_is_not_found() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");

        assert!(matches!(
            store.get_thread("nope"),
            Err(GhostError::ThreadNotFound(_))
        ));
        assert!(matches!(
            store.add_message("nope", &ChatMessage::user("x")),
            Err(GhostError::ThreadNotFound(_))
        ));
        assert!(matches!(
            store.delete_thread("nope"),
            Err(GhostError::ThreadNotFound(_))
        ));
        assert!(matches!(
            store.get_messages("../escape"),
            Err(GhostError::ThreadNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_document_is_corruption_not_missing() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");
        let thread = store.create_thread("t").expect("create");
        fs::write(
            store.threads_dir().join(format!("{}.json", thread.id)),
            "{ not json",
        )
        .expect("clobber");

        assert!(matches!(
            store.get_thread(&thread.id),
            Err(GhostError::DataCorruption { .. })
        ));
        assert!(store.list_threads().expect("list").is_empty());
    }

    #[test]
    fn test_update_thread_bumps_updated_at() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");
        let mut thread = store.create_thread("old").expect("create");

        thread.title = "new".to_string();
        let updated = store.update_thread(&thread).expect("update");
        assert_eq!(updated.title, "new");
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(store.get_thread(&thread.id).expect("get").title, "new");
    }

    #[test]
    fn test_tool_call_fields_survive_storage() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");
        let thread = store.create_thread("tools").expect("create");

        let call = ToolCall::new("echo", json!({"x": "a"}));
        store
            .add_message(
                &thread.id,
                &ChatMessage::assistant_with_tool_calls("", vec![call.clone()]),
            )
            .expect("assistant");
        store
            .add_message(&thread.id, &ChatMessage::tool_result("call_0", "a"))
            .expect("tool");

        let messages = store.get_messages(&thread.id).expect("messages");
        assert_eq!(messages[0].tool_calls, vec![call]);
        assert_eq!(messages[1].role, Role::Tool);
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_0"));
        assert!(messages[1].created_at >= messages[0].created_at);
    }

    #[test]
    fn test_newer_document_version_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let store = ThreadStore::open(temp.path()).expect("open store");
        let thread = store.create_thread("v").expect("create");
        let path = store.threads_dir().join(format!("{}.json", thread.id));
        let mut raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        raw["version"] = json!(DOCUMENT_VERSION + 1);
        fs::write(&path, serde_json::to_vec(&raw).expect("encode")).expect("write");

        assert!(matches!(
            store.get_messages(&thread.id),
            Err(GhostError::DataCorruption { .. })
        ));
    }
}
