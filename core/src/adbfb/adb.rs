// SPDX-License-Identifier: AGPL-3.0-or-later
//! ADB message protocol: `CNXN`/`AUTH` handshake, then `OPEN`/`WRTE`/
//! `OKAY`/`CLSE` stream multiplexing. Adapted from the reference
//! `AdbConnection`/`AdbStream` pair (`open_service`, `write`,
//! `read_to_end`), split so this module owns only the stream state
//! machine and defers wire encoding to [`crate::framing::adb_message`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::error::{Error, Result};
use crate::framing::adb_message::{
    Message, A_AUTH, A_CLSE, A_CNXN, A_OKAY, A_OPEN, A_WRTE, AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN,
};
use crate::transport::Transport;

const HOST_VERSION: u32 = 0x0100_0001;
const HOST_MAX_DATA: u32 = 256 * 1024;
const STREAM_CHUNK: usize = 64 * 1024;

/// Host-side RSA key used to answer `AUTH(type=1, token)` challenges.
/// ADB's auth token is conventionally a 20-byte SHA-1 digest signed with
/// unprefixed PKCS#1 v1.5 padding (no DigestInfo), the same "sign exactly
/// these bytes" shape SLA's BROM challenge uses.
pub struct HostAuthKey {
    private: RsaPrivateKey,
}

impl HostAuthKey {
    pub fn new(private: RsaPrivateKey) -> Self {
        Self { private }
    }

    fn sign_token(&self, token: &[u8]) -> Result<Vec<u8>> {
        self.private
            .sign(Pkcs1v15Sign::new_unprefixed(), token)
            .map_err(|e| Error::AuthFailed(format!("ADB host auth signing failed: {e}")))
    }

    /// A minimal `RSAPublicKey`-shaped blob (modulus + exponent, base64)
    /// suitable for presenting to the device on `AUTH(type=3)`.
    fn public_key_blob(&self) -> Vec<u8> {
        use base64::Engine;
        let public = RsaPublicKey::from(&self.private);
        let mut raw = Vec::new();
        raw.extend_from_slice(&public.n().to_bytes_le());
        raw.extend_from_slice(&public.e().to_bytes_le());
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        format!("{encoded} mft-host@device\0").into_bytes()
    }
}

/// Where the host's persistent ADB auth keypair lives; real `adb` keeps
/// one at `~/.android/adbkey` so a device only has to authorize this host
/// once. Overridable for tests and for hosts without a writable home dir.
fn host_key_path() -> PathBuf {
    if let Ok(dir) = std::env::var("MFT_ADB_KEY_DIR") {
        return PathBuf::from(dir).join("adbkey");
    }
    dirs_home().join(".android").join("adbkey")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Loads the host key from `path` if present, otherwise generates a fresh
/// 2048-bit key and persists it (PKCS#1 PEM, matching the format real
/// `adb` writes) so later runs authenticate against the same device
/// authorization the user already granted.
pub async fn load_or_generate_host_key(path: Option<&Path>) -> Result<HostAuthKey> {
    let path = path.map(PathBuf::from).unwrap_or_else(host_key_path);

    if let Ok(pem) = tokio::fs::read_to_string(&path).await {
        let private = RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| Error::AuthFailed(format!("malformed ADB host key at {}: {e}", path.display())))?;
        return Ok(HostAuthKey::new(private));
    }

    let mut rng = rand::rngs::OsRng;
    let private =
        RsaPrivateKey::new(&mut rng, 2048).map_err(|e| Error::Internal(format!("generating ADB host key: {e}")))?;
    let pem = private
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .map_err(|e| Error::Internal(format!("encoding ADB host key: {e}")))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(Error::Io)?;
    }
    tokio::fs::write(&path, pem.as_bytes()).await.map_err(Error::Io)?;

    Ok(HostAuthKey::new(private))
}

#[derive(Debug, Clone, Default)]
pub struct DeviceBanner {
    pub system_type: String,
    pub serial: String,
    pub props: HashMap<String, String>,
}

fn parse_banner(raw: &[u8]) -> DeviceBanner {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\0');
    let mut parts = text.splitn(3, "::");
    let system_type = parts.next().unwrap_or_default().to_string();
    let serial = parts.next().unwrap_or_default().to_string();
    let features = parts.next().unwrap_or_default();

    let mut props = HashMap::new();
    for kv in features.split(';') {
        if let Some((k, v)) = kv.split_once('=') {
            props.insert(k.to_string(), v.to_string());
        }
    }

    DeviceBanner { system_type, serial, props }
}

/// Owns the connection-level ADB state: the transport, the device's
/// negotiated `max_data`, and the next local stream id to hand out.
pub struct AdbConnection<'t> {
    transport: &'t mut dyn Transport,
    pub max_data: u32,
    pub banner: DeviceBanner,
    next_local_id: u32,
}

impl<'t> AdbConnection<'t> {
    async fn send(&mut self, msg: Message) -> Result<()> {
        self.transport.write_all(&msg.encode()).await
    }

    async fn recv(&mut self) -> Result<Message> {
        let mut header = [0u8; crate::framing::adb_message::HEADER_LEN];
        self.transport.read_exact(&mut header).await?;
        let (cmd, arg0, arg1, len) = Message::decode_header(&header)?;
        let mut payload = vec![0u8; len];
        if len > 0 {
            self.transport.read_exact(&mut payload).await?;
        }
        Ok(Message::new(cmd, arg0, arg1, payload))
    }

    /// Sends `CNXN`, answers at most one `AUTH(type=1)` challenge (with a
    /// signature, then a public key if challenged again), and returns
    /// once the device's own `CNXN` banner has been parsed.
    pub async fn connect(
        transport: &'t mut dyn Transport,
        features: &[&str],
        host_key: Option<&HostAuthKey>,
    ) -> Result<Self> {
        let banner = format!("host::features={}", features.join(","));
        let mut conn = Self { transport, max_data: HOST_MAX_DATA, banner: DeviceBanner::default(), next_local_id: 1 };

        conn.send(Message::new(A_CNXN, HOST_VERSION, HOST_MAX_DATA, banner.into_bytes())).await?;

        let mut sent_signature = false;
        loop {
            let msg = conn.recv().await?;
            match msg.cmd {
                x if x == A_CNXN => {
                    conn.max_data = msg.arg1.min(HOST_MAX_DATA).max(4096);
                    conn.banner = parse_banner(&msg.payload);
                    return Ok(conn);
                }
                x if x == A_AUTH && msg.arg0 == AUTH_TOKEN => {
                    let Some(key) = host_key else {
                        return Err(Error::AuthFailed("device requires AUTH but no host key was supplied".into()));
                    };
                    if !sent_signature {
                        let signature = key.sign_token(&msg.payload)?;
                        conn.send(Message::new(A_AUTH, AUTH_SIGNATURE, 0, signature)).await?;
                        sent_signature = true;
                    } else {
                        conn.send(Message::new(A_AUTH, AUTH_RSAPUBLICKEY, 0, key.public_key_blob())).await?;
                    }
                }
                _ => {}
            }
        }
    }

    fn alloc_local_id(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }

    /// `OPEN(local_id, 0, destination\0)`, returning once the device's
    /// `OKAY(remote_id)` arrives.
    pub async fn open(&mut self, destination: &str) -> Result<AdbStream<'_, 't>> {
        let local_id = self.alloc_local_id();
        let mut payload = destination.as_bytes().to_vec();
        payload.push(0);
        self.send(Message::new(A_OPEN, local_id, 0, payload)).await?;

        loop {
            let msg = self.recv().await?;
            match msg.cmd {
                x if x == A_OKAY => {
                    return Ok(AdbStream { conn: self, local_id, remote_id: msg.arg0 });
                }
                x if x == A_CLSE => {
                    return Err(Error::proto(format!("device closed stream while opening '{destination}'")));
                }
                _ => {}
            }
        }
    }
}

/// A single opened ADB stream: `WRTE`/`OKAY` in both directions, `CLSE`
/// to tear down.
pub struct AdbStream<'c, 't> {
    conn: &'c mut AdbConnection<'t>,
    local_id: u32,
    remote_id: u32,
}

impl<'c, 't> AdbStream<'c, 't> {
    /// Writes `data` in `max_data`-sized `WRTE` frames, waiting for the
    /// matching `OKAY` after each.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let chunk_size = (self.conn.max_data as usize).min(STREAM_CHUNK).max(1);
        for chunk in data.chunks(chunk_size) {
            self.conn.send(Message::new(A_WRTE, self.local_id, self.remote_id, chunk.to_vec())).await?;
            loop {
                let msg = self.conn.recv().await?;
                match msg.cmd {
                    x if x == A_OKAY => break,
                    x if x == A_CLSE => return Err(Error::proto("stream closed by device during write")),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Reads frames until `CLSE`, acking every `WRTE` and accumulating
    /// its payload.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let msg = self.conn.recv().await?;
            match msg.cmd {
                x if x == A_WRTE => {
                    out.extend_from_slice(&msg.payload);
                    self.conn.send(Message::new(A_OKAY, self.local_id, msg.arg0, Vec::new())).await?;
                }
                x if x == A_CLSE => {
                    self.conn.send(Message::new(A_CLSE, self.local_id, msg.arg0, Vec::new())).await?;
                    return Ok(out);
                }
                _ => {}
            }
        }
    }

    /// Reads exactly one `WRTE` frame's payload (acking it), or `None`
    /// if the device closed the stream instead.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let msg = self.conn.recv().await?;
            match msg.cmd {
                x if x == A_WRTE => {
                    self.conn.send(Message::new(A_OKAY, self.local_id, msg.arg0, Vec::new())).await?;
                    return Ok(Some(msg.payload));
                }
                x if x == A_CLSE => return Ok(None),
                _ => {}
            }
        }
    }

    pub async fn close(self) -> Result<()> {
        self.conn.send(Message::new(A_CLSE, self.local_id, self.remote_id, Vec::new())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_banner_props() {
        let banner = parse_banner(b"device::ro.product.name=foo;ro.build.version.sdk=34\0");
        assert_eq!(banner.system_type, "device");
        assert_eq!(banner.props.get("ro.product.name"), Some(&"foo".to_string()));
        assert_eq!(banner.props.get("ro.build.version.sdk"), Some(&"34".to_string()));
    }

    #[test]
    fn host_key_signs_token_with_modulus_length_output() {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let key = HostAuthKey::new(private);
        let token = [0x42u8; 20];
        let sig = key.sign_token(&token).unwrap();
        assert_eq!(sig.len(), 256);
    }

    #[test]
    fn public_key_blob_is_base64_with_trailing_identity() {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let key = HostAuthKey::new(private);
        let blob = key.public_key_blob();
        let text = String::from_utf8(blob).unwrap();
        assert!(text.ends_with("mft-host@device\0"));
    }

    #[tokio::test]
    async fn load_or_generate_persists_and_reuses_the_same_key() {
        let dir = std::env::temp_dir().join(format!("mft-adbkey-test-{:?}", std::thread::current().id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("adbkey");

        let first = load_or_generate_host_key(Some(&path)).await.unwrap();
        let second = load_or_generate_host_key(Some(&path)).await.unwrap();

        let token = [7u8; 20];
        assert_eq!(first.sign_token(&token).unwrap(), second.sign_token(&token).unwrap());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
