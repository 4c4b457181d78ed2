use std::num::NonZeroUsize;
use std::thread;

/// Number of workers when none is configured.
pub fn default_threads() -> usize { thread::available_parallelism().map_or(1, NonZeroUsize::get) }

/// Run `op` inside a dedicated rayon pool of `threads` workers. Parallel
/// iterators inside `op` use that pool. If the pool cannot be built, `op`
/// runs on the global pool instead.
pub(crate) fn install<R: Send>(threads: usize, name: &str, op: impl FnOnce() -> R + Send) -> R {
    let prefix = name.to_string();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build();
    match pool {
        Ok(pool) => pool.install(op),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to the global worker pool");
            op()
        }
    }
}
