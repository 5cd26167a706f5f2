use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context};
use rusqlite::{Connection, Transaction, TransactionBehavior};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy)]
enum Role {
    Writer,
    Reader,
}

/// SQLite access for the chatbot store.
///
/// Every mutation goes through the single writer connection, so writes are
/// serialized in-process. Readers run against WAL snapshots and never block
/// the writer. Read-modify-write sequences must use [`DbPool::transaction`];
/// a read on a reader connection followed by a separate write can lose updates.
pub struct DbPool {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl DbPool {
    /// Open (creating if needed) the database at `path` with `readers` reader
    /// connections. At least one reader is always opened.
    pub fn open(path: impl AsRef<Path>, readers: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let writer = connect(path, Role::Writer)?;
        let readers = (0..readers.max(1))
            .map(|_| connect(path, Role::Reader).map(Mutex::new))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run `f` on the writer connection without opening a transaction.
    pub fn write<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self.writer()?;
        f(&conn)
    }

    /// Run `f` inside an immediate transaction on the writer connection.
    ///
    /// Reads made through the transaction see every committed write and no
    /// other writer can interleave until `f` returns. The transaction commits
    /// when `f` returns `Ok` and rolls back otherwise.
    pub fn transaction<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> anyhow::Result<T>,
    {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` on a reader connection. Readers are handed out round-robin,
    /// skipping any that are busy; if all are busy the call waits on the
    /// next one in turn.
    pub fn read<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        let count = self.readers.len();
        for offset in 0..count {
            if let Ok(conn) = self.readers[(start + offset) % count].try_lock() {
                return f(&conn);
            }
        }
        let conn = self.readers[start % count]
            .lock()
            .map_err(|_| anyhow!("database reader lock poisoned"))?;
        f(&conn)
    }

    fn writer(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| anyhow!("database writer lock poisoned"))
    }
}

fn connect(path: &Path, role: Role) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(path = %path.display(), mode = %mode, "database is not in WAL mode");
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    if let Role::Writer = role {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    Ok(conn)
}
