// This file is part of h5cloud.
//
// The public interface: open a file (local or HTTP), enumerate and
// describe its datasets, and read data either whole (small, non-chunked
// datasets), by individual/batched chunk, or by arbitrary region. All read
// operations take a `&CancellationToken`, per the concurrency model.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::catalog::{walker, Attribute, ChunkLocation, Dataset, LazyChunkIndex, MetadataSource};
use crate::config::ReaderOptions;
use crate::error::{Error, Result};
use crate::fetch::{self, FetchRequest};
use crate::filters::decode::{decode_elements, DecodedArray};
use crate::filters::FilterChain;
use crate::format::messages::Layout;
use crate::format::Superblock;
use crate::io::http::HttpSource;
use crate::io::posix::FileSource;
use crate::io::ByteSource;

/// Decoded boundary values of a 1-D dataset, per `Reader::read_dataset_endpoints`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetEndpoints {
    pub first: f32,
    pub last: f32,
    pub length: u64,
}

pub struct Reader {
    source: Arc<dyn ByteSource>,
    semaphore: Arc<Semaphore>,
    metadata: MetadataSource,
    options: ReaderOptions,
    root_addr: u64,
    catalog: OnceCell<HashMap<String, Dataset>>,
    chunk_indices: RwLock<HashMap<String, Arc<LazyChunkIndex>>>,
    closed: AtomicBool,
}

impl Reader {
    pub async fn open_file(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Reader> {
        let source: Arc<dyn ByteSource> = Arc::new(FileSource::open(path)?);
        Self::open(source, options).await
    }

    pub async fn open_http(shard_urls: Vec<String>, options: ReaderOptions) -> Result<Reader> {
        const HTTP_READ_AHEAD_BYTES: u64 = 64 * 1024;
        let source: Arc<dyn ByteSource> = Arc::new(HttpSource::open(shard_urls, HTTP_READ_AHEAD_BYTES).await?);
        Self::open(source, options).await
    }

    pub async fn open(source: Arc<dyn ByteSource>, options: ReaderOptions) -> Result<Reader> {
        let semaphore = Arc::new(Semaphore::new(options.get_max_in_flight()));
        let cancel = CancellationToken::new();
        let prefix_len = options.resolve_metadata_prefix_bytes(source.is_local()).min(source.len());
        let prefix = {
            let _permit = crate::io::acquire_permit(&semaphore, &cancel).await?;
            source.fetch_range(0, prefix_len, &cancel).await?
        };

        let superblock = {
            let mut r = crate::buffer::BufferReader::new(&prefix, 0);
            Superblock::parse(&mut r)?
        };

        let metadata = MetadataSource::new(
            source.clone(),
            semaphore.clone(),
            prefix,
            superblock.offset_size,
            superblock.length_size,
            superblock.end_of_file_address,
        );

        let reader = Reader {
            source,
            semaphore,
            metadata,
            options,
            root_addr: superblock.root_group_address,
            catalog: OnceCell::new(),
            chunk_indices: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };

        if !options.get_lazy_tree_walking() {
            reader.ensure_catalog(&cancel).await?;
        }
        Ok(reader)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    async fn ensure_catalog(&self, cancel: &CancellationToken) -> Result<&HashMap<String, Dataset>> {
        self.catalog.get_or_try_init(|| walker::walk_tree(&self.metadata, self.root_addr, cancel)).await
    }

    pub async fn list_datasets(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.check_open()?;
        let catalog = self.ensure_catalog(cancel).await?;
        Ok(catalog.keys().cloned().collect())
    }

    pub async fn find_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Dataset> {
        self.check_open()?;
        let catalog = self.ensure_catalog(cancel).await?;
        catalog.get(path).cloned().ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub async fn get_attributes(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<Attribute>> {
        let dataset = self.find_by_path(path, cancel).await?;
        Ok(dataset.attributes)
    }

    /// Reads the entirety of a compact or contiguous (non-chunked)
    /// dataset. Chunked datasets must go through `read_chunk`/
    /// `read_chunks_batch`/`read_region`.
    pub async fn read_small_dataset(&self, path: &str, cancel: &CancellationToken) -> Result<DecodedArray> {
        self.check_open()?;
        let dataset = self.find_by_path(path, cancel).await?;
        let raw = match &dataset.layout {
            Layout::Compact { data } => data.clone(),
            Layout::Contiguous { address, size } => match address {
                Some(addr) => {
                    let _permit = crate::io::acquire_permit(&self.semaphore, cancel).await?;
                    self.source.fetch_range(*addr, *size, cancel).await?.to_vec()
                }
                None => vec![0u8; *size as usize],
            },
            Layout::Chunked { .. } => return Err(Error::unsupported("read_small_dataset called on a chunked dataset")),
        };
        decode_elements(&raw, dataset.dtype, dataset.element_size)
    }

    async fn chunk_index_for(&self, path: &str, cancel: &CancellationToken) -> Result<(Dataset, Arc<LazyChunkIndex>)> {
        let dataset = self.find_by_path(path, cancel).await?;
        if !dataset.is_chunked() {
            return Err(Error::NotChunked(path.to_string()));
        }
        let mut indices = self.chunk_indices.write().await;
        let entry = indices.entry(path.to_string()).or_insert_with(|| Arc::new(LazyChunkIndex::new()));
        Ok((dataset, entry.clone()))
    }

    /// The chunk B-tree's key dimensionality is one more than the dataset's
    /// chunk dimensions: a trailing slot always present for the
    /// element-size dimension, fixed at zero here since no dataset in this
    /// reader's scope is itself an array-of-arrays.
    fn btree_dimensionality(chunk_dims: &[u32]) -> u8 {
        chunk_dims.len() as u8 + 1
    }

    fn chunk_key(chunk_offsets: &[u64]) -> Vec<u64> {
        let mut key = chunk_offsets.to_vec();
        key.push(0);
        key
    }

    /// Looks up a chunk's on-disk location. Returns `Ok((dataset, None))`
    /// rather than failing when the coordinate has no entry in the chunk
    /// B-tree — such chunks are sparse and decode to `null`/zero-fill, not
    /// an error.
    async fn locate_chunk(&self, path: &str, chunk_offsets: &[u64], cancel: &CancellationToken) -> Result<(Dataset, Option<ChunkLocation>)> {
        let (dataset, lazy_index) = self.chunk_index_for(path, cancel).await?;
        let Layout::Chunked { btree_address, chunk_dims } = &dataset.layout else {
            unreachable!("chunk_index_for already verified the dataset is chunked");
        };
        let dimensionality = Self::btree_dimensionality(chunk_dims);
        let index = lazy_index.get_or_build(&self.metadata, *btree_address, dimensionality, cancel).await?;
        let key = Self::chunk_key(chunk_offsets);
        Ok((dataset, index.get(&key)))
    }

    fn decode_chunk_bytes(dataset: &Dataset, raw: &[u8]) -> Result<DecodedArray> {
        let unfiltered = if dataset.filter_pipeline.filters.is_empty() {
            let expected_size = dataset
                .chunk_dims()
                .map(|dims| dims.iter().map(|&d| d as u64).product::<u64>())
                .unwrap_or(0)
                * dataset.element_size as u64;
            crate::filters::decode_chunk_with_fallback(raw, expected_size, dataset.element_size)?
        } else {
            let chain = FilterChain::from_pipeline(&dataset.filter_pipeline)?;
            chain.unfilter(raw)?
        };
        decode_elements(&unfiltered, dataset.dtype, dataset.element_size)
    }

    /// Reads one chunk. Returns `Ok(None)` for a sparse chunk (a coordinate
    /// with no entry in the chunk B-tree) rather than failing.
    pub async fn read_chunk(&self, path: &str, chunk_offsets: &[u64], cancel: &CancellationToken) -> Result<Option<DecodedArray>> {
        self.check_open()?;
        let (dataset, location) = self.locate_chunk(path, chunk_offsets, cancel).await?;
        let Some(location) = location else {
            return Ok(None);
        };
        let raw = {
            let _permit = crate::io::acquire_permit(&self.semaphore, cancel).await?;
            self.source.fetch_range(location.address, location.size as u64, cancel).await?
        };
        Ok(Some(Self::decode_chunk_bytes(&dataset, &raw)?))
    }

    /// Reads a batch of chunks. Each output slot is `None` when its
    /// coordinate is sparse (absent from the chunk B-tree); present chunks
    /// are merged into coalesced ranges and fetched together.
    pub async fn read_chunks_batch(
        &self,
        path: &str,
        chunk_offsets_list: &[Vec<u64>],
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<DecodedArray>>> {
        self.check_open()?;
        if chunk_offsets_list.is_empty() {
            return Ok(Vec::new());
        }
        let mut locations: Vec<Option<ChunkLocation>> = Vec::with_capacity(chunk_offsets_list.len());
        let mut dataset = None;
        for offsets in chunk_offsets_list {
            let (ds, loc) = self.locate_chunk(path, offsets, cancel).await?;
            dataset = Some(ds);
            locations.push(loc);
        }
        let dataset = dataset.expect("non-empty chunk_offsets_list guarantees at least one lookup");

        let present: Vec<(usize, ChunkLocation)> =
            locations.iter().enumerate().filter_map(|(i, l)| l.map(|loc| (i, loc))).collect();
        let requests: Vec<FetchRequest> =
            present.iter().map(|(_, l)| FetchRequest { offset: l.address, len: l.size as u64 }).collect();
        let bytes = fetch::fetch_all(
            &self.source,
            &self.semaphore,
            &requests,
            self.options.get_merge_gap(),
            self.options.get_max_range_bytes(),
            self.source.is_local(),
            cancel,
        )
        .await?;

        let mut decoded: Vec<Option<DecodedArray>> = vec![None; chunk_offsets_list.len()];
        for ((idx, _), raw) in present.iter().zip(bytes.iter()) {
            decoded[*idx] = Some(Self::decode_chunk_bytes(&dataset, raw)?);
        }
        Ok(decoded)
    }

    /// Reads every chunk overlapping `region_start..region_start+region_shape`
    /// and stitches the requested sub-region out of them. Only dense,
    /// row-major output is produced; the result is always `region_shape`'s
    /// element count, in row-major order over `region_shape`.
    pub async fn read_region(
        &self,
        path: &str,
        region_start: &[u64],
        region_shape: &[u64],
        cancel: &CancellationToken,
    ) -> Result<DecodedArray> {
        self.check_open()?;
        let dataset = self.find_by_path(path, cancel).await?;
        let chunk_dims = dataset
            .chunk_dims()
            .ok_or_else(|| Error::NotChunked(path.to_string()))?
            .to_vec();
        let rank = dataset.rank();
        if region_start.len() != rank || region_shape.len() != rank {
            return Err(Error::out_of_range("region_start/region_shape rank mismatch with dataset"));
        }

        let chunk_coords = enumerate_overlapping_chunks(region_start, region_shape, &chunk_dims[..rank]);
        let chunks = self.read_chunks_batch(path, &chunk_coords, cancel).await?;

        stitch_region(region_start, region_shape, &chunk_dims[..rank], &chunk_coords, chunks)
    }

    /// `{first, last, length}` for a 1-D contiguous or chunked dataset
    /// (decoded boundary values, not storage addresses), or `None` when the
    /// dataset isn't 1-D, is empty, or decodes to a non-numeric type.
    pub async fn read_dataset_endpoints(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DatasetEndpoints>> {
        self.check_open()?;
        let dataset = self.find_by_path(path, cancel).await?;
        if dataset.rank() != 1 {
            return Ok(None);
        }
        let length = dataset.dims[0];
        if length == 0 {
            return Ok(None);
        }

        match &dataset.layout {
            Layout::Compact { .. } | Layout::Contiguous { .. } => {
                let decoded = self.read_small_dataset(path, cancel).await?;
                let DecodedArray::Float32(values) = decoded else {
                    return Ok(None);
                };
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(DatasetEndpoints { first: values[0], last: *values.last().unwrap(), length }))
            }
            Layout::Chunked { chunk_dims, .. } => {
                let chunk_len = chunk_dims[0] as u64;
                let last_index = length - 1;
                let last_chunk_start = (last_index / chunk_len) * chunk_len;
                let coords = vec![vec![0u64], vec![last_chunk_start]];
                let mut results = self.read_chunks_batch(path, &coords, cancel).await?.into_iter();

                let Some(Some(DecodedArray::Float32(first_chunk))) = results.next() else {
                    return Ok(None);
                };
                let Some(Some(DecodedArray::Float32(last_chunk))) = results.next() else {
                    return Ok(None);
                };
                let first = first_chunk[0];
                let last = last_chunk[(last_index - last_chunk_start) as usize];

                Ok(Some(DatasetEndpoints { first, last, length }))
            }
        }
    }

    /// Closes the reader. Idempotent; any read issued afterward fails
    /// immediately with `Error::Closed` without touching the byte source.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn enumerate_overlapping_chunks(region_start: &[u64], region_shape: &[u64], chunk_dims: &[u32]) -> Vec<Vec<u64>> {
    let rank = region_start.len();
    let mut starts_per_dim = Vec::with_capacity(rank);
    for d in 0..rank {
        let first_chunk = (region_start[d] / chunk_dims[d] as u64) * chunk_dims[d] as u64;
        let end = region_start[d] + region_shape[d];
        let mut offs = Vec::new();
        let mut cur = first_chunk;
        while cur < end {
            offs.push(cur);
            cur += chunk_dims[d] as u64;
        }
        starts_per_dim.push(offs);
    }
    cartesian_product(&starts_per_dim)
}

fn cartesian_product(dims: &[Vec<u64>]) -> Vec<Vec<u64>> {
    let mut result = vec![Vec::new()];
    for dim in dims {
        let mut next = Vec::with_capacity(result.len() * dim.len());
        for prefix in &result {
            for &v in dim {
                let mut p = prefix.clone();
                p.push(v);
                next.push(p);
            }
        }
        result = next;
    }
    result
}

/// Stitches a region's overlapping chunks into one dense, row-major `f32`
/// buffer. A `None` entry is a sparse chunk and contributes zeros — the
/// output buffer starts zero-filled, so sparse chunks are simply skipped.
fn stitch_region(
    region_start: &[u64],
    region_shape: &[u64],
    chunk_dims: &[u32],
    chunk_coords: &[Vec<u64>],
    chunks: Vec<Option<DecodedArray>>,
) -> Result<DecodedArray> {
    let rank = region_shape.len();
    let total: u64 = region_shape.iter().product();
    let mut out = vec![0f32; total as usize];
    let chunk_dims_u64: Vec<u64> = chunk_dims.iter().map(|&d| d as u64).collect();

    for (coord, chunk) in chunk_coords.iter().zip(chunks.into_iter()) {
        let Some(chunk) = chunk else {
            continue;
        };
        let DecodedArray::Float32(values) = chunk else {
            return Err(Error::unsupported("read_region does not support string/compound dtypes"));
        };
        visit_chunk_overlap(region_start, region_shape, coord, &chunk_dims_u64, rank, &mut |region_idx, local_idx| {
            out[region_idx] = values[local_idx];
        });
    }

    Ok(DecodedArray::Float32(out))
}

/// Calls `visit(region_flat_index, chunk_flat_index)` for every element
/// that lies in both the requested region and this one chunk.
fn visit_chunk_overlap(
    region_start: &[u64],
    region_shape: &[u64],
    chunk_coord: &[u64],
    chunk_dims: &[u64],
    rank: usize,
    visit: &mut impl FnMut(usize, usize),
) {
    let mut overlap_start = vec![0u64; rank];
    let mut overlap_len = vec![0u64; rank];
    for d in 0..rank {
        let region_lo = region_start[d];
        let region_hi = region_start[d] + region_shape[d];
        let chunk_lo = chunk_coord[d];
        let chunk_hi = chunk_coord[d] + chunk_dims[d];
        let lo = region_lo.max(chunk_lo);
        let hi = region_hi.min(chunk_hi);
        if lo >= hi {
            return;
        }
        overlap_start[d] = lo;
        overlap_len[d] = hi - lo;
    }

    let mut counters = vec![0u64; rank];
    loop {
        let mut region_idx = 0u64;
        let mut region_stride = 1u64;
        let mut chunk_idx = 0u64;
        let mut chunk_stride = 1u64;
        for d in (0..rank).rev() {
            let global = overlap_start[d] + counters[d];
            region_idx += (global - region_start[d]) * region_stride;
            region_stride *= region_shape[d];
            chunk_idx += (global - chunk_coord[d]) * chunk_stride;
            chunk_stride *= chunk_dims[d];
        }
        visit(region_idx as usize, chunk_idx as usize);

        let mut d = rank;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            counters[d] += 1;
            if counters[d] < overlap_len[d] {
                break;
            }
            counters[d] = 0;
            if d == 0 {
                return;
            }
        }
    }
}
