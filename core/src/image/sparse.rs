// SPDX-License-Identifier: AGPL-3.0-or-later
//! Android sparse image format: a 28-byte file header followed by a
//! stream of 12-byte chunk headers, each describing a `Raw`, `Fill`,
//! `Skip` or `Crc32` region of the expanded (logical) image.
//!
//! Struct-of-offsets little-endian parsing, the same shape as this
//! crate's other fixed-header binary formats.

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::image::SPARSE_MAGIC;

const FILE_HEADER_LEN: usize = 28;
const CHUNK_HEADER_LEN: usize = 12;

const CHUNK_TYPE_RAW: u16 = 0xCAC1;
const CHUNK_TYPE_FILL: u16 = 0xCAC2;
const CHUNK_TYPE_SKIP: u16 = 0xCAC3;
const CHUNK_TYPE_CRC32: u16 = 0xCAC4;

#[derive(Debug, Clone, Copy)]
pub struct SparseHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub file_hdr_sz: u16,
    pub chunk_hdr_sz: u16,
    pub blk_sz: u32,
    pub total_blks: u32,
    pub total_chunks: u32,
    pub image_checksum: u32,
}

impl SparseHeader {
    pub fn total_logical_size(&self) -> u64 {
        self.blk_sz as u64 * self.total_blks as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Raw(Vec<u8>),
    Fill { value: u32, len: u64 },
    Skip(u64),
    Crc32(u32),
}

impl Chunk {
    /// Byte length the chunk expands to in the logical image (not the
    /// length of bytes actually transmitted for `Fill`/`Skip`).
    pub fn logical_len(&self) -> u64 {
        match self {
            Chunk::Raw(b) => b.len() as u64,
            Chunk::Fill { len, .. } => *len,
            Chunk::Skip(len) => *len,
            Chunk::Crc32(_) => 0,
        }
    }

    /// Materializes the chunk's bytes in full — callers streaming to a
    /// transport should prefer not to call this for large `Fill`/`Skip`
    /// runs and instead write the pattern incrementally.
    pub fn expand(&self) -> Vec<u8> {
        match self {
            Chunk::Raw(b) => b.clone(),
            Chunk::Fill { value, len } => {
                let mut out = Vec::with_capacity(*len as usize);
                let word = value.to_le_bytes();
                while (out.len() as u64) < *len {
                    out.extend_from_slice(&word);
                }
                out.truncate(*len as usize);
                out
            }
            Chunk::Skip(len) => vec![0u8; *len as usize],
            Chunk::Crc32(_) => Vec::new(),
        }
    }
}

pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<SparseHeader> {
    let mut hdr = [0u8; FILE_HEADER_LEN];
    reader.read_exact(&mut hdr).await.map_err(Error::Io)?;

    let magic = u32::from_le_bytes(hdr[0..4].try_into().unwrap());
    if magic != SPARSE_MAGIC {
        return Err(Error::ImageInvalid(format!(
            "bad sparse magic 0x{magic:08X}, expected 0x{SPARSE_MAGIC:08X}"
        )));
    }

    Ok(SparseHeader {
        major_version: u16::from_le_bytes(hdr[4..6].try_into().unwrap()),
        minor_version: u16::from_le_bytes(hdr[6..8].try_into().unwrap()),
        file_hdr_sz: u16::from_le_bytes(hdr[8..10].try_into().unwrap()),
        chunk_hdr_sz: u16::from_le_bytes(hdr[10..12].try_into().unwrap()),
        blk_sz: u32::from_le_bytes(hdr[12..16].try_into().unwrap()),
        total_blks: u32::from_le_bytes(hdr[16..20].try_into().unwrap()),
        total_chunks: u32::from_le_bytes(hdr[20..24].try_into().unwrap()),
        image_checksum: u32::from_le_bytes(hdr[24..28].try_into().unwrap()),
    })
}

/// Streams chunks out of an already-positioned-at-start sparse file.
pub struct SparseReader {
    file: File,
    header: SparseHeader,
    chunks_read: u32,
}

impl SparseReader {
    pub async fn new(mut file: File) -> Result<Self> {
        let header = read_header(&mut file).await?;
        Ok(Self { file, header, chunks_read: 0 })
    }

    pub fn header(&self) -> &SparseHeader {
        &self.header
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.chunks_read >= self.header.total_chunks {
            return Ok(None);
        }

        let mut hdr = [0u8; CHUNK_HEADER_LEN];
        self.file.read_exact(&mut hdr).await.map_err(Error::Io)?;
        self.chunks_read += 1;

        let chunk_type = u16::from_le_bytes(hdr[0..2].try_into().unwrap());
        let chunk_blocks = u32::from_le_bytes(hdr[4..8].try_into().unwrap());
        let total_sz = u32::from_le_bytes(hdr[8..12].try_into().unwrap());
        let logical_len = chunk_blocks as u64 * self.header.blk_sz as u64;
        let body_len = total_sz as usize - CHUNK_HEADER_LEN;

        let chunk = match chunk_type {
            CHUNK_TYPE_RAW => {
                let mut buf = vec![0u8; body_len];
                self.file.read_exact(&mut buf).await.map_err(Error::Io)?;
                Chunk::Raw(buf)
            }
            CHUNK_TYPE_FILL => {
                let mut word = [0u8; 4];
                self.file.read_exact(&mut word).await.map_err(Error::Io)?;
                Chunk::Fill { value: u32::from_le_bytes(word), len: logical_len }
            }
            CHUNK_TYPE_SKIP => Chunk::Skip(logical_len),
            CHUNK_TYPE_CRC32 => {
                let mut crc = [0u8; 4];
                self.file.read_exact(&mut crc).await.map_err(Error::Io)?;
                Chunk::Crc32(u32::from_le_bytes(crc))
            }
            other => {
                return Err(Error::ImageInvalid(format!("unknown sparse chunk type 0x{other:04X}")));
            }
        };

        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn build_sparse(blk_sz: u32, total_blks: u32, chunks: &[(u16, u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SPARSE_MAGIC.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(FILE_HEADER_LEN as u16).to_le_bytes());
        out.extend_from_slice(&(CHUNK_HEADER_LEN as u16).to_le_bytes());
        out.extend_from_slice(&blk_sz.to_le_bytes());
        out.extend_from_slice(&total_blks.to_le_bytes());
        out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        for (chunk_type, chunk_blocks, body) in chunks {
            out.extend_from_slice(&chunk_type.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&chunk_blocks.to_le_bytes());
            out.extend_from_slice(&((CHUNK_HEADER_LEN + body.len()) as u32).to_le_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    async fn write_temp(bytes: &[u8]) -> (std::path::PathBuf, File) {
        let dir = std::env::temp_dir().join(format!("mft-sparse-test-{}", uuid_ish()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("s.img");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        drop(f);
        let file = File::open(&path).await.unwrap();
        (path, file)
    }

    fn uuid_ish() -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos() as u64
    }

    #[tokio::test]
    async fn expands_fill_chunk_to_expected_bytes() {
        let raw = vec![1u8, 2, 3, 4];
        let fill_blocks = 200u32;
        let blk_sz = 4096u32;
        let data = build_sparse(
            blk_sz,
            1 + fill_blocks,
            &[(CHUNK_TYPE_RAW, 1, raw.clone()), (CHUNK_TYPE_FILL, fill_blocks, 0xDEADBEEFu32.to_le_bytes().to_vec())],
        );
        let (path, file) = write_temp(&data).await;
        let mut reader = SparseReader::new(file).await.unwrap();

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1, Chunk::Raw(raw));

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        let expected_len = fill_blocks as u64 * blk_sz as u64;
        match &c2 {
            Chunk::Fill { value, len } => {
                assert_eq!(*value, 0xDEADBEEF);
                assert_eq!(*len, expected_len);
            }
            _ => panic!("expected fill chunk"),
        }
        let expanded = c2.expand();
        assert_eq!(expanded.len() as u64, expected_len);
        assert!(expanded.chunks(4).all(|w| w == [0xEF, 0xBE, 0xAD, 0xDE]));

        assert!(reader.next_chunk().await.unwrap().is_none());
        tokio::fs::remove_dir_all(path.parent().unwrap()).await.ok();
    }

    #[tokio::test]
    async fn total_logical_size_matches_blocks_times_block_size() {
        let data = build_sparse(4096, 1024, &[(CHUNK_TYPE_SKIP, 1024, vec![])]);
        let (path, mut file) = write_temp(&data).await;
        let header = read_header(&mut file).await.unwrap();
        assert_eq!(header.total_logical_size(), 1024 * 4096);
        tokio::fs::remove_dir_all(path.parent().unwrap()).await.ok();
    }
}
