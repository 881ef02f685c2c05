// This file is part of h5cloud.
//
// Local-file byte source. Wraps `positioned_io::RandomAccessFile` the same
// way the teacher crate's POSIX VFS wraps a plain file descriptor behind
// `ReadAt`, except every read is pushed onto a blocking-pool thread via
// `tokio::task::spawn_blocking` so the async contract above this module is
// uniform regardless of source kind.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use positioned_io::ReadAt;
use tokio_util::sync::CancellationToken;

use super::{cancellable, BoxFuture, ByteSource};
use crate::error::{Error, Result, ResultExt};

pub struct FileSource {
    file: Arc<positioned_io::RandomAccessFile>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<FileSource> {
        let path = path.as_ref();
        let len = std::fs::metadata(path)
            .context_err(format!("while opening {}", path.display()))?
            .len();
        let file = positioned_io::RandomAccessFile::open(path)
            .context_err(format!("while opening {}", path.display()))?;
        Ok(FileSource { file: Arc::new(file), len })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn is_local(&self) -> bool {
        true
    }

    fn fetch_range<'a>(&'a self, offset: u64, len: u64, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            let file = self.file.clone();
            let read = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; len as usize];
                file.read_exact_at(offset, &mut buf)?;
                Ok::<_, std::io::Error>(buf)
            });
            cancellable(cancel, async move {
                match read.await {
                    Ok(Ok(buf)) => Ok(Bytes::from(buf)),
                    Ok(Err(io_err)) => Err(Error::from(io_err)),
                    Err(_join_err) => Err(Error::Transport("blocking read task panicked".into())),
                }
            })
            .await
        })
    }
}
