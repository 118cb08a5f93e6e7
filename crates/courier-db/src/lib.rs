pub mod auth;
pub mod cache;
pub mod channels;
pub mod clock;
pub mod error;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod push;
pub mod tokens;

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use tracing::info;

pub use cache::{AuthCache, CacheConfig, CacheKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};

const WRITER_POOL_SIZE: usize = 4;
const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables the stores read at runtime.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Random bytes in a generated access-token secret.
    pub token_size: usize,
    /// Largest accepted message payload in bytes.
    pub max_message_size: usize,
    pub cache: CacheConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            token_size: 64,
            max_message_size: 64 * 1024,
            cache: CacheConfig::default(),
        }
    }
}

/// SQLite-backed store with a writer pool and a read-only reader pool.
///
/// Writers run IMMEDIATE transactions and rely on `busy_timeout` to queue
/// behind each other; readers see the last committed WAL snapshot.
pub struct Database {
    writers: Vec<Mutex<Connection>>,
    readers: Vec<Mutex<Connection>>,
    writer_idx: AtomicUsize,
    reader_idx: AtomicUsize,
    clock: Arc<dyn Clock>,
    cache: AuthCache,
    config: DbConfig,
}

impl Database {
    pub fn open(path: &Path, config: DbConfig) -> Result<Self> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: &Path, config: DbConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let first = open_writer(path)?;
        migrations::run(&first)?;

        let mut writers = Vec::with_capacity(WRITER_POOL_SIZE);
        writers.push(Mutex::new(first));
        for _ in 1..WRITER_POOL_SIZE {
            writers.push(Mutex::new(open_writer(path)?));
        }

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} ({} writers + {} readers)",
            path.display(),
            WRITER_POOL_SIZE,
            READER_POOL_SIZE
        );

        Ok(Self {
            writers,
            readers,
            writer_idx: AtomicUsize::new(0),
            reader_idx: AtomicUsize::new(0),
            cache: AuthCache::new(&config.cache),
            clock,
            config,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| Error::Pool(format!("reader lock poisoned: {e}")))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let idx = self.writer_idx.fetch_add(1, Ordering::Relaxed) % self.writers.len();
        let mut conn = self.writers[idx]
            .lock()
            .map_err(|e| Error::Pool(format!("writer lock poisoned: {e}")))?;
        f(&mut conn)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn cache(&self) -> &AuthCache {
        &self.cache
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}

fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL mode for concurrent reads
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}
