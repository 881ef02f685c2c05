// This file is part of h5cloud.
//
// The batched chunk-fetch coalescer: merges nearby chunk byte ranges into
// fewer, larger HTTP GETs (merge-sweep-dispatch-split), then slices each
// original request's bytes back out of whatever merged range covered it.
// Local sources skip merging entirely — a `pread` has no per-request
// latency floor worth amortizing, so every chunk is just fetched in
// parallel.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::io::{acquire_permit, ByteSource};

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest {
    pub offset: u64,
    pub len: u64,
}

impl FetchRequest {
    fn end(&self) -> u64 {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, Copy)]
struct Group {
    start: u64,
    end: u64,
}

/// Sweeps sorted requests into merged dispatch groups: adjacent requests
/// within `merge_gap` bytes of each other join a group, unless doing so
/// would grow it past `max_range_bytes`, in which case the group is closed
/// and a new one started (the "split" half of merge-sweep-dispatch-split).
fn sweep(sorted: &[FetchRequest], merge_gap: u64, max_range_bytes: u64) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut current: Option<Group> = None;
    for req in sorted {
        match current {
            Some(g) if req.offset <= g.end.saturating_add(merge_gap) && req.end().saturating_sub(g.start) <= max_range_bytes => {
                current = Some(Group { start: g.start, end: g.end.max(req.end()) });
            }
            _ => {
                if let Some(g) = current.take() {
                    groups.push(g);
                }
                current = Some(Group { start: req.offset, end: req.end() });
            }
        }
    }
    if let Some(g) = current {
        groups.push(g);
    }
    groups
}

/// Fetches every requested range, merging nearby remote ranges into larger
/// GETs when `is_local` is false. Returns one `Bytes` per input request, in
/// the same order as `requests`.
pub async fn fetch_all(
    source: &Arc<dyn ByteSource>,
    semaphore: &Arc<tokio::sync::Semaphore>,
    requests: &[FetchRequest],
    merge_gap: u64,
    max_range_bytes: u64,
    is_local: bool,
    cancel: &CancellationToken,
) -> Result<Vec<Bytes>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    if is_local {
        let futures = requests.iter().map(|req| async move {
            let _permit = acquire_permit(semaphore, cancel).await?;
            source.fetch_range(req.offset, req.len, cancel).await
        });
        return futures::future::try_join_all(futures).await;
    }

    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by_key(|&i| requests[i].offset);
    let sorted: Vec<FetchRequest> = order.iter().map(|&i| requests[i]).collect();
    let groups = sweep(&sorted, merge_gap, max_range_bytes);

    let group_bytes_futures = groups.iter().map(|g| async move {
        let _permit = acquire_permit(semaphore, cancel).await?;
        source.fetch_range(g.start, g.end - g.start, cancel).await
    });
    let group_bytes = futures::future::try_join_all(group_bytes_futures).await?;

    // Slice each original request's bytes out of whichever group covers it.
    let mut results_by_original = vec![None; requests.len()];
    let mut group_idx = 0;
    for (pos, &orig_idx) in order.iter().enumerate() {
        let req = sorted[pos];
        while group_idx < groups.len() && req.offset >= groups[group_idx].end {
            group_idx += 1;
        }
        let group = groups[group_idx];
        let data = &group_bytes[group_idx];
        let start = (req.offset - group.start) as usize;
        let end = start + req.len as usize;
        results_by_original[orig_idx] = Some(data.slice(start..end));
    }
    Ok(results_by_original.into_iter().map(|b| b.expect("every request covered by some group")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_merges_adjacent_and_splits_oversized_groups() {
        let requests = vec![
            FetchRequest { offset: 0, len: 100 },
            FetchRequest { offset: 110, len: 100 }, // gap 10, within merge_gap
            FetchRequest { offset: 5000, len: 100 }, // far away, new group
        ];
        let groups = sweep(&requests, 16, 1_000_000);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].start, 0);
        assert_eq!(groups[0].end, 210);
        assert_eq!(groups[1].start, 5000);
    }

    #[test]
    fn sweep_respects_max_range_bytes() {
        let requests = vec![
            FetchRequest { offset: 0, len: 100 },
            FetchRequest { offset: 100, len: 100 },
            FetchRequest { offset: 200, len: 100 },
        ];
        let groups = sweep(&requests, 16, 200);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].end - groups[0].start, 200);
        assert_eq!(groups[1].start, 200);
    }
}
