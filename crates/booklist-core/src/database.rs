use crate::group::GroupKind;
use crate::schema;
use crate::sync::Synchronizer;
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BooklistError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("style has no groups")]
    EmptyStyle,
    #[error("group kind {0:?} cannot be used as a style level")]
    UnsupportedGroupKind(GroupKind),
    #[error("group kind {0:?} appears more than once in the style")]
    DuplicateGroup(GroupKind),
    #[error("unknown group kind id: {0}")]
    UnknownGroupKind(i64),
    #[error("domain `{name}` is already defined as `{existing}`; cannot redefine it as `{requested}`")]
    DomainConflict {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("domain name `{0}` is reserved by the list table")]
    ReservedDomain(String),
    #[error("domain name {0:?} is not a plain SQL identifier")]
    InvalidDomainName(String),
    #[error("invalid collation name: {0:?}")]
    InvalidCollation(String),
    #[error("unsupported style schema version: {0}")]
    UnsupportedStyleVersion(u32),
    #[error("row position {position} is outside 0..{count}")]
    PositionOutOfRange { position: i64, count: i64 },
}

pub type Result<T> = std::result::Result<T, BooklistError>;

/// Monotonic source of instance ids used to name temporary tables.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Shared {
    conn: Mutex<Connection>,
    sync: Synchronizer,
    ids: Arc<IdAllocator>,
}

/// Handle to the single SQLite connection that backs every built list.
///
/// Cloning is cheap and shares the connection, the [`Synchronizer`] and the
/// instance-id allocator. Every statement runs under the synchronizer: reads
/// through [`Database::read`], mutations through [`Database::write`] or
/// [`Database::transaction`].
#[derive(Debug, Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Arc::new(IdAllocator::new()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, Arc::new(IdAllocator::new()))
    }

    pub fn open_uri(uri: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(uri, flags)?;
        Self::from_connection(conn, Arc::new(IdAllocator::new()))
    }

    /// Wrap an already opened connection, naming temporary tables with ids
    /// drawn from `ids`.
    pub fn from_connection(conn: Connection, ids: Arc<IdAllocator>) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::init(&conn)?;
        Ok(Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                sync: Synchronizer::new(),
                ids,
            }),
        })
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.shared.sync
    }

    pub(crate) fn next_instance_id(&self) -> u64 {
        self.shared.ids.next_id()
    }

    /// Run read-only statements under a shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _shared = self.shared.sync.acquire_shared();
        let conn = self.lock_conn();
        f(&conn)
    }

    /// Run mutating statements under the exclusive lock, without an explicit
    /// transaction.
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _exclusive = self.shared.sync.acquire_exclusive();
        let conn = self.lock_conn();
        f(&conn)
    }

    /// Run a multi-statement sequence in one transaction under the exclusive
    /// lock. The lock is held until the transaction commits or rolls back, so
    /// concurrent readers never observe a partial sequence.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let _exclusive = self.shared.sync.acquire_exclusive();
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        // Dropping `tx` on the error path rolls the transaction back.
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.shared.conn.lock().expect("database mutex poisoned")
    }
}
