// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serial Link Authorization: BROM and DA each challenge the host
//! differently when a command comes back with status `0x0C`.
//!
//! This crate never embeds real SLA private keys — [`SlaKeyStore`] is a
//! caller-supplied catalogue keyed by `hw_code`, and ships empty.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Error, Result};

pub const SLA_AUTH_REQUIRED_STATUS: u16 = 0x0C;

/// Caller-supplied SLA private keys, one per `hw_code`. Empty by default;
/// real keys must come from an external, out-of-band source.
#[derive(Default)]
pub struct SlaKeyStore {
    keys: std::collections::HashMap<u16, Vec<u8>>,
}

impl SlaKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_der(&mut self, hw_code: u16, pkcs1_der: Vec<u8>) {
        self.keys.insert(hw_code, pkcs1_der);
    }

    pub fn has_no_keys(&self) -> bool {
        self.keys.is_empty()
    }

    fn private_key(&self, hw_code: u16) -> Result<RsaPrivateKey> {
        let der = self
            .keys
            .get(&hw_code)
            .ok_or_else(|| Error::AuthFailed(format!("no SLA key registered for hw_code 0x{hw_code:04X}")))?;
        RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| Error::AuthFailed(format!("malformed SLA private key: {e}")))
    }
}

/// Swaps each adjacent byte pair: `[a, b, c, d] -> [b, a, d, c]`. BROM's
/// SLA challenge and its signature are both transformed this way before
/// signing/returning.
pub fn byte_pair_swap(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut i = 0;
    while i + 1 < out.len() {
        out.swap(i, i + 1);
        i += 2;
    }
    out
}

/// BROM-path SLA: byte-pair-swap the first 16 bytes of the challenge,
/// PKCS#1 v1.5-sign with the hw_code's private key, byte-pair-swap the
/// signature.
pub fn sign_brom_challenge(keys: &SlaKeyStore, hw_code: u16, challenge: &[u8]) -> Result<Vec<u8>> {
    if challenge.len() < 16 {
        return Err(Error::AuthFailed("SLA challenge shorter than 16 bytes".into()));
    }
    let key = keys.private_key(hw_code)?;
    let swapped = byte_pair_swap(&challenge[..16]);

    let signature = key
        .sign(Pkcs1v15Sign::new_unprefixed(), &swapped)
        .map_err(|e| Error::AuthFailed(format!("SLA BROM signing failed: {e}")))?;

    Ok(byte_pair_swap(&signature))
}

/// DA-path SLA: 16 bytes at offset 32 of the challenge, encrypted with
/// the device public key from the DA blob using RSA-OAEP(SHA-256), falling
/// back to PKCS#1 v1.5 if the device rejects OAEP.
pub fn encrypt_da_challenge(
    public_key: &RsaPublicKey,
    challenge: &[u8],
    prefer_oaep: bool,
) -> Result<Vec<u8>> {
    if challenge.len() < 48 {
        return Err(Error::AuthFailed("SLA DA challenge shorter than 48 bytes".into()));
    }
    let segment = &challenge[32..48];
    let mut rng = rand::rngs::OsRng;

    if prefer_oaep {
        let padding = Oaep::new::<Sha256>();
        if let Ok(ct) = public_key.encrypt(&mut rng, padding, segment) {
            return Ok(ct);
        }
    }

    public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, segment)
        .map_err(|e| Error::AuthFailed(format!("SLA DA encryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_pair_swap_reorders_adjacent_pairs() {
        let input = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(byte_pair_swap(&input), vec![2, 1, 4, 3, 6, 5]);
    }

    #[test]
    fn byte_pair_swap_is_involutive() {
        let input = [10u8, 20, 30, 40];
        assert_eq!(byte_pair_swap(&byte_pair_swap(&input)), input);
    }

    #[test]
    fn sign_brom_challenge_without_registered_key_fails() {
        let keys = SlaKeyStore::new();
        let challenge = [0u8; 16];
        let err = sign_brom_challenge(&keys, 0x766, &challenge).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::AuthFailed);
    }
}
