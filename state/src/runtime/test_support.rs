#![allow(clippy::unwrap_used)]

use super::StateRuntime;
use std::sync::Arc;
use tempfile::TempDir;

/// Open a fresh runtime over a throwaway database file.
///
/// The tempdir must outlive the runtime; callers keep it bound.
pub(crate) async fn open_test_runtime() -> (TempDir, Arc<StateRuntime>) {
    open_test_runtime_with_cap(crate::DEFAULT_RESULT_CAP).await
}

pub(crate) async fn open_test_runtime_with_cap(cap: usize) -> (TempDir, Arc<StateRuntime>) {
    let dir = TempDir::new().unwrap();
    let runtime = StateRuntime::init_with_result_cap(dir.path().to_path_buf(), cap)
        .await
        .unwrap();
    (dir, runtime)
}
