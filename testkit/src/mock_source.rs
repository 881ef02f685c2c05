// This file is part of h5cloud-testkit.
//
// An in-memory `ByteSource` for exercising concurrency and error paths
// without a real file or socket: configurable per-call latency, one-shot
// failure injection, and a call log so tests can assert which ranges were
// actually requested and in what order — the property the merge-sweep-
// dispatch-split coalescer needs verifying against.

use std::time::Duration;

use bytes::Bytes;
use h5cloud::error::{Error, Result};
use h5cloud::io::{BoxFuture, ByteSource};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFetch {
    pub offset: u64,
    pub len: u64,
}

pub struct MockSource {
    data: Vec<u8>,
    latency: Duration,
    is_local: bool,
    fail_next: Mutex<usize>,
    calls: Mutex<Vec<RecordedFetch>>,
}

impl MockSource {
    pub fn new(data: Vec<u8>) -> Self {
        MockSource { data, latency: Duration::ZERO, is_local: false, fail_next: Mutex::new(0), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Marks this source as local, so `fetch::fetch_all` skips range
    /// merging for it the same way it does for `FileSource`.
    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    /// Makes the next `n` `fetch_range` calls fail with `Error::Transport`
    /// before touching `data`, to exercise retry/cancellation paths above.
    pub async fn fail_next(&self, n: usize) {
        *self.fail_next.lock().await = n;
    }

    /// Every range actually requested so far, in call order.
    pub async fn calls(&self) -> Vec<RecordedFetch> {
        self.calls.lock().await.clone()
    }
}

impl ByteSource for MockSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_local(&self) -> bool {
        self.is_local
    }

    fn fetch_range<'a>(&'a self, offset: u64, len: u64, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            self.calls.lock().await.push(RecordedFetch { offset, len });

            if self.latency > Duration::ZERO {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.latency) => {}
                }
            } else if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            {
                let mut fail_next = self.fail_next.lock().await;
                if *fail_next > 0 {
                    *fail_next -= 1;
                    return Err(Error::Transport("injected failure".into()));
                }
            }

            let start = offset as usize;
            let end = start + len as usize;
            if end > self.data.len() {
                return Err(Error::Transport("mock source: range exceeds data length".into()));
            }
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_range_records_calls_and_returns_requested_slice() {
        let data: Vec<u8> = (0u8..32).collect();
        let source = MockSource::new(data.clone());
        let cancel = CancellationToken::new();
        let got = source.fetch_range(4, 8, &cancel).await.unwrap();
        assert_eq!(&got[..], &data[4..12]);
        assert_eq!(source.calls().await, vec![RecordedFetch { offset: 4, len: 8 }]);
    }

    #[tokio::test]
    async fn fail_next_injects_transport_error_once() {
        let source = MockSource::new(vec![0u8; 16]);
        let cancel = CancellationToken::new();
        source.fail_next(1).await;
        assert!(source.fetch_range(0, 4, &cancel).await.is_err());
        assert!(source.fetch_range(0, 4, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_completion() {
        let source = MockSource::new(vec![0u8; 16]).with_latency(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = source.fetch_range(0, 4, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
