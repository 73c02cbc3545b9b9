// SPDX-License-Identifier: AGPL-3.0-or-later
//! Firmware image handling: Android sparse image streaming and Super-Meta
//! (`super_def.*.json`) discovery.
//!
//! MediaTek DA images are pushed as flat files, so neither of these has
//! an equivalent elsewhere in this crate; both parse their fixed-size
//! little-endian headers the same struct-of-offsets way the rest of the
//! crate's binary parsers do.

pub mod sparse;
pub mod super_meta;

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::error::{Error, Result};

pub use sparse::{Chunk, SparseReader};

pub const SPARSE_MAGIC: u32 = 0xED26FF3A;
pub const DEFAULT_RAW_CHUNK: usize = 1024 * 1024;

/// A source of bytes for one image file, transparently exposing a sparse
/// image's logical (expanded) size even though the file on disk is
/// smaller.
pub struct ImageSource {
    path: PathBuf,
    file_len: u64,
    pub is_sparse: bool,
    pub logical_size: u64,
}

impl ImageSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .await
            .map_err(|e| Error::ImageInvalid(format!("{}: {e}", path.display())))?;
        let file_len = file.metadata().await.map_err(Error::Io)?.len();

        let mut magic_buf = [0u8; 4];
        let is_sparse = file.read_exact(&mut magic_buf).await.is_ok()
            && u32::from_le_bytes(magic_buf) == SPARSE_MAGIC;

        let logical_size = if is_sparse {
            file.seek(SeekFrom::Start(0)).await.map_err(Error::Io)?;
            sparse::read_header(&mut file).await?.total_logical_size()
        } else {
            file_len
        };

        Ok(Self { path, file_len, is_sparse, logical_size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Opens a fresh chunk stream over the file. Sparse images yield
    /// `Raw`/`Fill`/`Skip`/`Crc` chunks in file order; everything else
    /// yields fixed-size `Raw` chunks of `raw_chunk_size` bytes.
    pub async fn chunks(&self, raw_chunk_size: usize) -> Result<ChunkStream> {
        let mut file = File::open(&self.path)
            .await
            .map_err(|e| Error::ImageInvalid(format!("{}: {e}", self.path.display())))?;

        if self.is_sparse {
            file.seek(SeekFrom::Start(0)).await.map_err(Error::Io)?;
            let reader = SparseReader::new(file).await?;
            Ok(ChunkStream::Sparse(reader))
        } else {
            Ok(ChunkStream::Raw { file, chunk_size: raw_chunk_size.max(1), total: self.file_len })
        }
    }
}

pub enum ChunkStream {
    Sparse(SparseReader),
    Raw { file: File, chunk_size: usize, total: u64 },
}

impl ChunkStream {
    /// Pulls the next chunk, or `None` at end of stream.
    pub async fn next(&mut self) -> Result<Option<Chunk>> {
        match self {
            ChunkStream::Sparse(reader) => reader.next_chunk().await,
            ChunkStream::Raw { file, chunk_size, total } => {
                let remaining = *total;
                if remaining == 0 {
                    return Ok(None);
                }
                let to_read = (*chunk_size as u64).min(remaining) as usize;
                let mut buf = vec![0u8; to_read];
                file.read_exact(&mut buf).await.map_err(Error::Io)?;
                *total -= to_read as u64;
                Ok(Some(Chunk::Raw(buf)))
            }
        }
    }
}

/// Fully expands `path` into memory, decoding sparse chunks if present.
/// Engines that already buffer a whole partition image before writing it
/// (MediaTek DA, Unisoc FDL2) use this instead of a raw `std::fs::read`,
/// so a sparse source image is never written to the device as its
/// compressed on-disk bytes.
pub async fn read_expanded(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let source = ImageSource::open(&path).await?;
    let mut stream = source.chunks(DEFAULT_RAW_CHUNK).await?;
    let mut out = Vec::with_capacity(source.logical_size as usize);
    while let Some(chunk) = stream.next().await? {
        if let Chunk::Crc32(_) = chunk {
            continue;
        }
        out.extend_from_slice(&chunk.expand());
    }
    Ok(out)
}

/// Reads one partition's image bytes, honoring a PAC container's
/// `(offset, length)` byte range when present instead of treating `path`
/// as a standalone image file. PAC entries are never sparse — the range
/// is read verbatim.
pub async fn read_partition_bytes(path: impl AsRef<Path>, pac_range: Option<(u64, u64)>) -> Result<Vec<u8>> {
    match pac_range {
        Some((offset, length)) => {
            let path = path.as_ref();
            let mut file = File::open(path)
                .await
                .map_err(|e| Error::ImageInvalid(format!("{}: {e}", path.display())))?;
            file.seek(SeekFrom::Start(offset)).await.map_err(Error::Io)?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf).await.map_err(|e| {
                Error::ImageInvalid(format!("{}: PAC range {offset}+{length} out of bounds: {e}", path.display()))
            })?;
            Ok(buf)
        }
        None => read_expanded(path).await,
    }
}

/// A repeating 4-byte fill pattern being emitted across window boundaries;
/// `phase` tracks which byte of `word` comes next so a window cut doesn't
/// have to restart the pattern.
struct ActiveFill {
    word: [u8; 4],
    phase: usize,
    remaining: u64,
}

/// Streams a firmware image in caller-chosen window sizes without ever
/// materializing a whole `Fill`/`Skip` run: the §4.6 requirement that
/// Firehose "expand on the fly to avoid full in-memory materialisation".
/// `Raw` chunk bytes are buffered at most one sparse chunk at a time;
/// `Fill`/`Skip` runs are produced byte-by-byte from a 4-byte pattern.
pub struct WindowedSource {
    stream: ChunkStream,
    leftover: std::collections::VecDeque<u8>,
    active_fill: Option<ActiveFill>,
}

impl WindowedSource {
    pub async fn open(path: impl AsRef<Path>, window: usize) -> Result<Self> {
        let source = ImageSource::open(path).await?;
        let stream = source.chunks(window.max(1)).await?;
        Ok(Self { stream, leftover: std::collections::VecDeque::new(), active_fill: None })
    }

    /// Returns up to `want` bytes, or fewer once the source is exhausted
    /// (an empty `Vec` signals end of stream).
    pub async fn next_window(&mut self, want: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(want);

        while out.len() < want {
            if let Some(fill) = self.active_fill.as_mut() {
                while out.len() < want && fill.remaining > 0 {
                    out.push(fill.word[fill.phase]);
                    fill.phase = (fill.phase + 1) % 4;
                    fill.remaining -= 1;
                }
                if fill.remaining == 0 {
                    self.active_fill = None;
                }
                continue;
            }

            if let Some(byte) = self.leftover.pop_front() {
                out.push(byte);
                continue;
            }

            match self.stream.next().await? {
                None => break,
                Some(Chunk::Crc32(_)) => continue,
                Some(Chunk::Raw(bytes)) => self.leftover.extend(bytes),
                Some(Chunk::Fill { value, len }) => {
                    self.active_fill = Some(ActiveFill { word: value.to_le_bytes(), phase: 0, remaining: len });
                }
                Some(Chunk::Skip(len)) => {
                    self.active_fill = Some(ActiveFill { word: [0, 0, 0, 0], phase: 0, remaining: len });
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn read_partition_bytes_slices_a_pac_range_instead_of_reading_the_whole_container() {
        let dir = std::env::temp_dir().join(format!("mft-pacrange-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("firmware.pac");
        let mut body = vec![0xAAu8; 16];
        body.extend_from_slice(b"boot-partition-bytes");
        body.extend_from_slice(&[0xBBu8; 16]);
        let mut f = File::create(&path).await.unwrap();
        f.write_all(&body).await.unwrap();
        drop(f);

        let sliced = read_partition_bytes(&path, Some((16, 21))).await.unwrap();
        assert_eq!(sliced, b"boot-partition-bytes");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn read_partition_bytes_falls_back_to_whole_file_without_a_pac_range() {
        let dir = std::env::temp_dir().join(format!("mft-pacrange-fallback-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("flat.img");
        let mut f = File::create(&path).await.unwrap();
        f.write_all(b"whole-file").await.unwrap();
        drop(f);

        let out = read_partition_bytes(&path, None).await.unwrap();
        assert_eq!(out, b"whole-file");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn detects_non_sparse_image_as_raw() {
        let dir = std::env::temp_dir().join(format!("mft-image-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("flat.img");
        let mut f = File::create(&path).await.unwrap();
        f.write_all(&[0u8; 4096]).await.unwrap();
        drop(f);

        let src = ImageSource::open(&path).await.unwrap();
        assert!(!src.is_sparse);
        assert_eq!(src.logical_size, 4096);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn windowed_source_yields_requested_sizes_regardless_of_file_chunking() {
        let dir = std::env::temp_dir().join(format!("mft-windowed-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("flat.img");
        let body: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        let mut f = File::create(&path).await.unwrap();
        f.write_all(&body).await.unwrap();
        drop(f);

        let mut source = WindowedSource::open(&path, 777).await.unwrap();
        let mut out = Vec::new();
        loop {
            let window = source.next_window(333).await.unwrap();
            if window.is_empty() {
                break;
            }
            out.extend_from_slice(&window);
        }
        assert_eq!(out, body);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
