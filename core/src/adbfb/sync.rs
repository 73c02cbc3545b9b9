// SPDX-License-Identifier: AGPL-3.0-or-later
//! The `SYNC` sub-protocol spoken inside a `sync:` stream: `STAT`/`LIST`/
//! `SEND`/`RECV`/`DATA`/`DONE`/`OKAY`/`FAIL`, each a 4-byte id followed by
//! a little-endian `u32` length. Built on top of [`super::adb::AdbStream`]
//! the same way [`crate::framing::adb_message`] sits under
//! [`super::adb::AdbConnection`]: this module owns the sub-protocol state,
//! not the outer message framing.

use crate::error::{Error, Result};
use crate::orchestrator::CancellationHandle;

use super::adb::AdbStream;

const ID_STAT: u32 = sync_id(*b"STAT");
const ID_LIST: u32 = sync_id(*b"LIST");
const ID_SEND: u32 = sync_id(*b"SEND");
const ID_RECV: u32 = sync_id(*b"RECV");
const ID_DATA: u32 = sync_id(*b"DATA");
const ID_DONE: u32 = sync_id(*b"DONE");
const ID_OKAY: u32 = sync_id(*b"OKAY");
const ID_FAIL: u32 = sync_id(*b"FAIL");
const ID_DENT: u32 = sync_id(*b"DENT");

const MAX_CHUNK: usize = 64 * 1024;
const DEFAULT_FILE_MODE: u32 = 0o100_644;

const fn sync_id(tag: [u8; 4]) -> u32 {
    (tag[0] as u32) | ((tag[1] as u32) << 8) | ((tag[2] as u32) << 16) | ((tag[3] as u32) << 24)
}

#[derive(Debug, Clone)]
pub struct Stat {
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub stat: Stat,
}

/// Frames `sync:` requests and replies over an already-open stream; a
/// fresh session is opened for each push/pull/list/stat to keep the
/// request/response bookkeeping simple, matching how `adb` itself treats
/// `sync:` as a short-lived service.
pub struct SyncSession<'c, 't> {
    stream: AdbStream<'c, 't>,
    buf: Vec<u8>,
}

impl<'c, 't> SyncSession<'c, 't> {
    pub fn new(stream: AdbStream<'c, 't>) -> Self {
        Self { stream, buf: Vec::new() }
    }

    async fn fill(&mut self, want: usize) -> Result<()> {
        while self.buf.len() < want {
            let Some(chunk) = self.stream.read_frame().await? else {
                return Err(Error::DeviceLost);
            };
            self.buf.extend_from_slice(&chunk);
        }
        Ok(())
    }

    async fn take(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n).await?;
        Ok(self.buf.drain(..n).collect())
    }

    async fn read_id_len(&mut self) -> Result<(u32, u32)> {
        let header = self.take(8).await?;
        let id = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let len = u32::from_le_bytes(header[4..8].try_into().unwrap());
        Ok((id, len))
    }

    fn encode_request(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// `STAT(path)`, returning the device's reported mode/size/mtime.
    pub async fn stat(&mut self, path: &str) -> Result<Stat> {
        self.stream.write(&Self::encode_request(ID_STAT, path.as_bytes())).await?;
        let (id, _len) = self.read_id_len().await?;
        if id != ID_STAT {
            return Err(Error::proto("expected STAT reply"));
        }
        let body = self.take(12).await?;
        Ok(Stat {
            mode: u32::from_le_bytes(body[0..4].try_into().unwrap()),
            size: u32::from_le_bytes(body[4..8].try_into().unwrap()),
            mtime: u32::from_le_bytes(body[8..12].try_into().unwrap()),
        })
    }

    /// `LIST(path)`, collecting `DENT` entries until `DONE`.
    pub async fn list(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.stream.write(&Self::encode_request(ID_LIST, path.as_bytes())).await?;
        let mut entries = Vec::new();
        loop {
            let (id, _len) = self.read_id_len().await?;
            if id == ID_DONE {
                self.take(16).await.ok();
                return Ok(entries);
            }
            if id != ID_DENT {
                return Err(Error::proto("expected DENT or DONE in LIST reply"));
            }
            let body = self.take(16).await?;
            let mode = u32::from_le_bytes(body[0..4].try_into().unwrap());
            let size = u32::from_le_bytes(body[4..8].try_into().unwrap());
            let mtime = u32::from_le_bytes(body[8..12].try_into().unwrap());
            let name_len = u32::from_le_bytes(body[12..16].try_into().unwrap()) as usize;
            let name_bytes = self.take(name_len).await?;
            let name = String::from_utf8_lossy(&name_bytes).to_string();
            entries.push(DirEntry { name, stat: Stat { mode, size, mtime } });
        }
    }

    /// `SEND(path,mode)` followed by `DATA` chunks and a `DONE(mtime)`,
    /// expecting a final `OKAY`.
    pub async fn push(&mut self, remote_path: &str, data: &[u8], mtime: u32, cancel: &CancellationHandle) -> Result<()> {
        let header = format!("{remote_path},{DEFAULT_FILE_MODE}");
        self.stream.write(&Self::encode_request(ID_SEND, header.as_bytes())).await?;

        for chunk in data.chunks(MAX_CHUNK) {
            cancel.check()?;
            self.stream.write(&Self::encode_request(ID_DATA, chunk)).await?;
        }
        self.stream.write(&Self::encode_request(ID_DONE, &mtime.to_le_bytes())).await?;

        let (id, len) = self.read_id_len().await?;
        match id {
            x if x == ID_OKAY => Ok(()),
            x if x == ID_FAIL => {
                let msg = self.take(len as usize).await?;
                Err(Error::proto(format!("push failed: {}", String::from_utf8_lossy(&msg))))
            }
            _ => Err(Error::proto("expected OKAY or FAIL after push")),
        }
    }

    /// `RECV(path)`, accumulating `DATA` chunks until `DONE`.
    pub async fn pull(&mut self, remote_path: &str) -> Result<Vec<u8>> {
        self.stream.write(&Self::encode_request(ID_RECV, remote_path.as_bytes())).await?;
        let mut out = Vec::new();
        loop {
            let (id, len) = self.read_id_len().await?;
            match id {
                x if x == ID_DATA => out.extend_from_slice(&self.take(len as usize).await?),
                x if x == ID_DONE => return Ok(out),
                x if x == ID_FAIL => {
                    let msg = self.take(len as usize).await?;
                    return Err(Error::proto(format!("pull failed: {}", String::from_utf8_lossy(&msg))));
                }
                _ => return Err(Error::proto("unexpected id in RECV reply")),
            }
        }
    }

    pub async fn close(self) -> Result<()> {
        self.stream.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_ids_are_little_endian_ascii() {
        assert_eq!(ID_STAT.to_le_bytes(), *b"STAT");
        assert_eq!(ID_DATA.to_le_bytes(), *b"DATA");
        assert_eq!(ID_DONE.to_le_bytes(), *b"DONE");
    }

    #[test]
    fn encode_request_prefixes_little_endian_length() {
        let encoded = SyncSession::encode_request(ID_STAT, b"/sdcard/foo");
        assert_eq!(&encoded[0..4], b"STAT");
        assert_eq!(u32::from_le_bytes(encoded[4..8].try_into().unwrap()), 11);
        assert_eq!(&encoded[8..], b"/sdcard/foo");
    }
}
