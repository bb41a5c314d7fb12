//! Progress reporting callback.

use std::sync::Arc;

/// Called with `(current, total, message)` at phase boundaries and
/// periodically during long phases. Must return quickly.
pub type ProgressFn = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

pub(crate) fn report(progress: Option<&ProgressFn>, current: usize, total: usize, message: &str) {
    if let Some(progress) = progress {
        progress(current, total, message);
    }
}
