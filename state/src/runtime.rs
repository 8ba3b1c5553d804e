use crate::DEFAULT_RESULT_CAP;
use crate::migrations::MIGRATOR;
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteSynchronous;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

mod summaries;
mod task_runs;
#[cfg(test)]
mod test_support;
mod translations;
mod usage_events;

pub(crate) const STATE_DB_FILENAME: &str = "agent_state";
pub(crate) const STATE_DB_VERSION: u32 = 1;

/// Database files opened by this process; refuses a second open of the
/// same path so two runtimes never share one WAL.
static OPEN_DB_PATHS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[derive(Clone)]
pub struct StateRuntime {
    data_home: PathBuf,
    pool: Arc<SqlitePool>,
    result_cap: i64,
}

impl StateRuntime {
    /// Initialize the state runtime rooted at the provided data home.
    ///
    /// Opens (and migrates) the SQLite database at
    /// `data_home/agent_state_<version>.sqlite`.
    pub async fn init(data_home: PathBuf) -> anyhow::Result<Arc<Self>> {
        Self::init_with_result_cap(data_home, DEFAULT_RESULT_CAP).await
    }

    pub async fn init_with_result_cap(
        data_home: PathBuf,
        result_cap: usize,
    ) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&data_home).await?;
        let state_path = state_db_path(data_home.as_path());
        register_open_path(&state_path)?;
        let pool = match open_sqlite(&state_path).await {
            Ok(db) => Arc::new(db),
            Err(err) => {
                warn!("failed to open state db at {}: {err}", state_path.display());
                release_open_path(&state_path);
                return Err(err);
            }
        };
        Ok(Arc::new(Self {
            data_home,
            pool,
            result_cap: i64::try_from(result_cap).unwrap_or(i64::MAX),
        }))
    }

    /// Return the configured data home for this runtime.
    pub fn data_home(&self) -> &Path {
        self.data_home.as_path()
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        self.pool.as_ref()
    }

    pub(crate) fn result_cap(&self) -> i64 {
        self.result_cap
    }
}

fn register_open_path(path: &Path) -> anyhow::Result<()> {
    let mut open = OPEN_DB_PATHS
        .lock()
        .map_err(|_| anyhow::anyhow!("open-path registry poisoned"))?;
    if !open.insert(path.to_path_buf()) {
        anyhow::bail!("state db already open in this process: {}", path.display());
    }
    Ok(())
}

fn release_open_path(path: &Path) {
    if let Ok(mut open) = OPEN_DB_PATHS.lock() {
        open.remove(path);
    }
}

async fn open_sqlite(path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(LevelFilter::Off);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

pub fn state_db_filename() -> String {
    format!("{STATE_DB_FILENAME}_{STATE_DB_VERSION}.sqlite")
}

pub fn state_db_path(data_home: &Path) -> PathBuf {
    data_home.join(state_db_filename())
}
