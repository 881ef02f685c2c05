// This file is part of h5cloud.
//
// The byte source abstraction: a ranged-read contract both local files and
// remote HTTP shards implement identically, so everything above this layer
// (structural parsing, the fetch coalescer, the public reader) never knows
// which kind of source it's talking to.
//
// `async fn` in a trait isn't object-safe yet, and this crate needs
// `Arc<dyn ByteSource>`, so the method is hand-desugared to a boxed future
// instead of reaching for the `async-trait` macro.

pub mod http;
pub mod posix;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ByteSource: Send + Sync {
    /// Total size of the underlying object in bytes, resolved once at
    /// construction time (a `stat`/HEAD call, depending on the source).
    fn len(&self) -> u64;

    /// Whether this source is a local file. The fetch coalescer skips
    /// range-merging for local sources, since a `pread` has no per-request
    /// latency floor worth amortizing the way an HTTP round trip does.
    fn is_local(&self) -> bool {
        false
    }

    /// Fetches exactly `len` bytes starting at `offset`. Implementations
    /// must respect `cancel` promptly: once it's cancelled, any in-flight
    /// work should unwind and return `Error::Cancelled` rather than
    /// continuing to completion.
    fn fetch_range<'a>(&'a self, offset: u64, len: u64, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Bytes>>;
}

/// Runs `fut` to completion unless `cancel` fires first, in which case the
/// future is dropped and `Error::Cancelled` is returned. Shared by both
/// `ByteSource` implementors so cancellation semantics stay identical
/// whether the work is a `spawn_blocking` pread or an in-flight HTTP GET.
pub async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Acquires a permit from the shared fetch semaphore, honoring
/// cancellation while waiting for one to free up.
pub async fn acquire_permit<'a>(
    semaphore: &'a Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Result<tokio::sync::SemaphorePermit<'a>> {
    cancellable(cancel, async {
        semaphore
            .acquire()
            .await
            .map_err(|_| Error::Transport("fetch semaphore closed".into()))
    })
    .await
}
