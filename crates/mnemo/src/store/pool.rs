// crates/mnemo/src/store/pool.rs
// Pooled SQLite access with the sqlite-vec extension registered, against an
// explicit data-directory path rather than one derived from the process
// working directory. See DESIGN.md for that choice.

use crate::error::{MnemoError, Result};
use crate::utils::path_to_string;
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers the sqlite-vec extension globally (once per process). Must run
/// before any connection is opened.
#[allow(clippy::missing_transmute_annotations)]
fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init matches the signature sqlite3_auto_extension
        // expects; this is the standard registration pattern for a statically
        // linked SQLite loadable extension.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Connection pool for the hot vector store, with per-connection pragmas
/// applied at construction time.
pub struct HotStorePool {
    pool: Pool,
}

impl HotStorePool {
    /// Open (or create) the hot-store database at `path` and run schema
    /// migrations for the given embedding dimension.
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        ensure_sqlite_vec_registered();
        ensure_parent_directory(path)?;
        // Pre-create the backing file so sibling subsystems constructed
        // concurrently never race the first write.
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let conn_str = path_to_string(path);
        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| MnemoError::Pool(e.to_string()))?
            .build()
            .map_err(|e| MnemoError::Pool(e.to_string()))?;

        let store = Self { pool };
        store.apply_pragmas().await?;
        store.migrate(dimension).await?;
        Ok(store)
    }

    async fn apply_pragmas(&self) -> Result<()> {
        self.interact(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            )
        })
        .await
    }

    /// Open an in-memory pool (for tests), sharing state across connections
    /// via a named shared-cache URI.
    pub async fn open_in_memory(dimension: usize, label: &str) -> Result<Self> {
        ensure_sqlite_vec_registered();
        let uri = format!("file:mnemo_{label}?mode=memory&cache=shared");
        let cfg = Config::new(&uri);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| MnemoError::Pool(e.to_string()))?
            .max_size(1) // a single connection keeps the shared in-memory db alive
            .build()
            .map_err(|e| MnemoError::Pool(e.to_string()))?;
        let store = Self { pool };
        store.migrate(dimension).await?;
        Ok(store)
    }

    async fn migrate(&self, dimension: usize) -> Result<()> {
        self.interact(move |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS memories (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    text TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    run_id TEXT,
                    categories TEXT NOT NULL DEFAULT '[]',
                    metadata TEXT NOT NULL DEFAULT '{}',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(user_id, run_id);",
            )?;
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_memories USING vec0(embedding float[{dimension}]);"
            ))?;
            Ok(())
        })
        .await
    }

    /// Run a blocking closure against a pooled connection, converting pool
    /// and interaction errors into [`MnemoError`].
    pub async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(MnemoError::from)?;
        conn.interact(move |conn| f(conn).map_err(MnemoError::from))
            .await
            .map_err(MnemoError::from)?
    }

    /// Approximate backing-store byte count (file size on disk; 0 for an
    /// in-memory pool with no backing path).
    pub fn size_bytes(&self, path: Option<&PathBuf>) -> u64 {
        path.and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }
}
