// This file is part of h5cloud.
//
// Reader configuration, a setter-per-field builder in the style of the
// teacher crate's `WalkOptions` (`io/service.rs`): every field has a
// spec-mandated default, and every setter takes `self` by value and
// returns `Self` so calls chain.

const DEFAULT_METADATA_PREFIX_BYTES_REMOTE: u64 = 8 * 1024 * 1024;
const DEFAULT_METADATA_PREFIX_BYTES_LOCAL: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    max_in_flight: usize,
    merge_gap: u64,
    max_range_bytes: u64,
    metadata_prefix_bytes: Option<u64>,
    lazy_tree_walking: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            max_in_flight: 8,
            merge_gap: 1024 * 1024,
            max_range_bytes: 8 * 1024 * 1024,
            metadata_prefix_bytes: None,
            lazy_tree_walking: true,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on concurrently in-flight byte-source requests (shared
    /// across metadata and chunk-data fetches via one semaphore).
    pub fn max_in_flight(mut self, value: usize) -> Self {
        self.max_in_flight = value;
        self
    }

    /// Maximum byte distance between two chunk ranges for the fetch
    /// coalescer to merge them into one GET.
    pub fn merge_gap(mut self, value: u64) -> Self {
        self.merge_gap = value;
        self
    }

    /// Upper bound on a single merged GET's size; a merge that would
    /// exceed this is split into multiple dispatches instead.
    pub fn max_range_bytes(mut self, value: u64) -> Self {
        self.max_range_bytes = value;
        self
    }

    /// Size of the initial metadata prefix fetched at `open`, before any
    /// fetch-and-grow retries. Overrides the source-dependent default (8
    /// MiB remote, 1 MiB local) applied when this is left unset.
    pub fn metadata_prefix_bytes(mut self, value: u64) -> Self {
        self.metadata_prefix_bytes = Some(value);
        self
    }

    /// When true (the default), group/attribute parsing happens lazily as
    /// datasets are looked up rather than eagerly walking the whole object
    /// graph at `open`.
    pub fn lazy_tree_walking(mut self, value: bool) -> Self {
        self.lazy_tree_walking = value;
        self
    }

    pub fn get_max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn get_merge_gap(&self) -> u64 {
        self.merge_gap
    }

    pub fn get_max_range_bytes(&self) -> u64 {
        self.max_range_bytes
    }

    /// Resolves the metadata prefix size for a source of the given
    /// locality: an explicit `metadata_prefix_bytes` override if one was
    /// set, otherwise the source-dependent default.
    pub fn resolve_metadata_prefix_bytes(&self, is_local: bool) -> u64 {
        self.metadata_prefix_bytes.unwrap_or(if is_local {
            DEFAULT_METADATA_PREFIX_BYTES_LOCAL
        } else {
            DEFAULT_METADATA_PREFIX_BYTES_REMOTE
        })
    }

    pub fn get_lazy_tree_walking(&self) -> bool {
        self.lazy_tree_walking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = ReaderOptions::default();
        assert_eq!(opts.get_max_in_flight(), 8);
        assert_eq!(opts.get_merge_gap(), 1024 * 1024);
        assert_eq!(opts.get_max_range_bytes(), 8 * 1024 * 1024);
        assert_eq!(opts.resolve_metadata_prefix_bytes(false), 8 * 1024 * 1024);
        assert_eq!(opts.resolve_metadata_prefix_bytes(true), 1024 * 1024);
        assert!(opts.get_lazy_tree_walking());
    }

    #[test]
    fn explicit_metadata_prefix_bytes_overrides_both_localities() {
        let opts = ReaderOptions::new().metadata_prefix_bytes(4096);
        assert_eq!(opts.resolve_metadata_prefix_bytes(false), 4096);
        assert_eq!(opts.resolve_metadata_prefix_bytes(true), 4096);
    }

    #[test]
    fn builder_chains_and_overrides() {
        let opts = ReaderOptions::new().max_in_flight(4).merge_gap(100).lazy_tree_walking(false);
        assert_eq!(opts.get_max_in_flight(), 4);
        assert_eq!(opts.get_merge_gap(), 100);
        assert!(!opts.get_lazy_tree_walking());
    }
}
