use crate::error::{GhostError, Result};
use crate::store::{Thread, ThreadStore};
use std::io::Write;

pub fn summary_line(thread: &Thread) -> String {
    format!(
        "{}  {}  {}",
        thread.id,
        thread.updated_at.format("%Y-%m-%d %H:%M"),
        thread.title
    )
}

/// `ghost threads`: most recently updated first.
pub fn list<W: Write>(store: &ThreadStore, out: &mut W) -> Result<()> {
    let threads = store.list_threads()?;
    let io_err = |e| GhostError::io("writing thread list", e);
    if threads.is_empty() {
        writeln!(out, "no saved threads").map_err(io_err)?;
        return Ok(());
    }
    for thread in &threads {
        writeln!(out, "{}", summary_line(thread)).map_err(io_err)?;
    }
    Ok(())
}

/// `ghost threads rm <id>`
pub fn remove<W: Write>(store: &ThreadStore, id: &str, out: &mut W) -> Result<()> {
    store.delete_thread(id)?;
    writeln!(out, "removed {id}").map_err(|e| GhostError::io("writing confirmation", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use tempfile::TempDir;

    #[test]
    fn test_list_prints_recent_first() {
        let temp = TempDir::new().expect("tempdir");
        let store = ThreadStore::open(temp.path()).expect("store");
        let older = store.create_thread("older").expect("create");
        let newer = store.create_thread("newer").expect("create");
        store
            .add_message(&newer.id, &ChatMessage::user("bump"))
            .expect("append");

        let mut out = Vec::new();
        list(&store, &mut out).expect("list");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&newer.id) && lines[0].ends_with("newer"));
        assert!(lines[1].starts_with(&older.id));
    }

    #[test]
    fn test_list_empty_store() {
        let temp = TempDir::new().expect("tempdir");
        let store = ThreadStore::open(temp.path()).expect("store");
        let mut out = Vec::new();
        list(&store, &mut out).expect("list");
        assert_eq!(out, b"no saved threads\n");
    }

    #[test]
    fn test_remove_deletes_and_unknown_id_fails() {
        let temp = TempDir::new().expect("tempdir");
        let store = ThreadStore::open(temp.path()).expect("store");
        let thread = store.create_thread("bye").expect("create");

        remove(&store, &thread.id, &mut Vec::new()).expect("remove");
        assert!(matches!(
            store.get_thread(&thread.id),
            Err(GhostError::ThreadNotFound(_))
        ));
        assert!(matches!(
            remove(&store, &thread.id, &mut Vec::new()),
            Err(GhostError::ThreadNotFound(_))
        ));
    }
}
