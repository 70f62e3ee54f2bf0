//! USM key derivation and the cryptographic operations built on it.
//!
//! Key derivation follows RFC 3414 Appendix A.2: the password is repeated
//! into a 1 MB stream and hashed, then the result is localized to the
//! authoritative engine as `H(master || engine_id || master)`. Privacy
//! keys are derived the same way with the auth protocol's hash and
//! truncated to the cipher key length.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use digest::Digest;
use hmac::{Hmac, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, PrivProtocol};
use crate::error::{CryptoErrorKind, Error, Result};

/// Derive a localized key from a password and the authoritative engine
/// ID: `deriveKey(protocol, password, engineId) -> key`.
///
/// An empty password yields an all-zero key of the digest length.
pub fn derive_key(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let master = password_to_key(protocol, password);
    localize_key(protocol, &master, engine_id)
}

/// RFC 3414 A.2.1 password expansion.
fn password_to_key(protocol: AuthProtocol, password: &[u8]) -> Vec<u8> {
    const EXPANSION_SIZE: usize = 1_048_576; // 1MB

    match protocol {
        AuthProtocol::Md5 => password_to_key_impl::<md5::Md5>(password, EXPANSION_SIZE),
        AuthProtocol::Sha1 => password_to_key_impl::<sha1::Sha1>(password, EXPANSION_SIZE),
    }
}

fn password_to_key_impl<D>(password: &[u8], expansion_size: usize) -> Vec<u8>
where
    D: Digest,
{
    if password.is_empty() {
        return vec![0u8; <D as Digest>::output_size()];
    }

    let mut hasher = D::new();

    // repeat the password into 64-byte chunks, matching net-snmp
    let mut buf = [0u8; 64];
    let mut password_index = 0;
    let mut count = 0;

    while count < expansion_size {
        for byte in &mut buf {
            *byte = password[password_index];
            password_index = (password_index + 1) % password.len();
        }
        hasher.update(buf);
        count += 64;
    }

    hasher.finalize().to_vec()
}

/// RFC 3414 A.2.2 key localization.
fn localize_key(protocol: AuthProtocol, master: &[u8], engine_id: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::Md5 => localize_key_impl::<md5::Md5>(master, engine_id),
        AuthProtocol::Sha1 => localize_key_impl::<sha1::Sha1>(master, engine_id),
    }
}

fn localize_key_impl<D>(master: &[u8], engine_id: &[u8]) -> Vec<u8>
where
    D: Digest,
{
    let mut hasher = D::new();
    hasher.update(master);
    hasher.update(engine_id);
    hasher.update(master);
    hasher.finalize().to_vec()
}

/// Localized authentication key.
///
/// Key material is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl AuthKey {
    /// Derive from a password for a discovered engine.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        Self {
            key: derive_key(protocol, password, engine_id),
            protocol,
        }
    }

    /// Wrap an already-localized key.
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    /// The protocol.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// The localized key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Truncated MAC length (HMAC-96).
    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// HMAC over `data`, truncated to the MAC length.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mac = match self.protocol {
            AuthProtocol::Md5 => {
                let mut mac = Hmac::<md5::Md5>::new_from_slice(&self.key)
                    .expect("HMAC accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            AuthProtocol::Sha1 => {
                let mut mac = Hmac::<sha1::Sha1>::new_from_slice(&self.key)
                    .expect("HMAC accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        mac[..self.mac_len()].to_vec()
    }

    /// Constant-time comparison of a received MAC against `data`.
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> bool {
        if expected.len() != self.mac_len() {
            return false;
        }
        let computed = self.sign(data);
        computed.ct_eq(expected).into()
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKey")
            .field("protocol", &self.protocol)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Compute and patch the HMAC of an outgoing message whose auth-params
/// field holds the zero placeholder.
pub fn authenticate_message(key: &AuthKey, encoded: &mut [u8], offset: usize, len: usize) {
    let mac = key.sign(encoded);
    let n = len.min(mac.len());
    encoded[offset..offset + n].copy_from_slice(&mac[..n]);
}

/// Verify an incoming message: zero the auth-params field, recompute,
/// compare in constant time.
pub fn verify_message(key: &AuthKey, encoded: &[u8], offset: usize, len: usize) -> bool {
    if len != key.mac_len() || offset + len > encoded.len() {
        return false;
    }
    let received = &encoded[offset..offset + len];
    let mut zeroed = encoded.to_vec();
    zeroed[offset..offset + len].fill(0);
    key.verify(&zeroed, received)
}

/// Localized privacy key with its cipher operations.
///
/// Key material is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Derive from a password.
    ///
    /// Per RFC 3414 the privacy key reuses the authentication protocol's
    /// derivation, truncated to the cipher key length.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        priv_protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let mut key = derive_key(auth_protocol, password, engine_id);
        key.truncate(priv_protocol.key_len());
        Self {
            key,
            protocol: priv_protocol,
        }
    }

    /// The protocol.
    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt a scoped PDU, returning `(ciphertext, priv_params)`.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salts: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, engine_boots, salts),
            PrivProtocol::Aes128 => self.encrypt_aes(plaintext, engine_boots, engine_time, salts),
        }
    }

    /// Decrypt a scoped PDU.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        priv_params: &[u8],
        engine_boots: u32,
        engine_time: u32,
    ) -> Result<Bytes> {
        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, priv_params),
            PrivProtocol::Aes128 => {
                self.decrypt_aes(ciphertext, priv_params, engine_boots, engine_time)
            }
        }
    }

    /// DES-CBC (RFC 3414 Section 8). Salt: boots || counter; IV: pre-IV
    /// (last 8 key octets) XOR salt.
    fn encrypt_des(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        salts: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        use cbc::cipher::{KeyIvInit, block_padding::NoPadding, BlockEncryptMut};

        let (des_key, pre_iv) = self.des_key_parts()?;

        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
        salt[4..].copy_from_slice(&(salts.next() as u32).to_be_bytes());

        let mut iv = [0u8; 8];
        for i in 0..8 {
            iv[i] = pre_iv[i] ^ salt[i];
        }

        let mut padded = plaintext.to_vec();
        let rem = padded.len() % 8;
        if rem != 0 {
            padded.resize(padded.len() + (8 - rem), 0);
        }

        let cipher = cbc::Encryptor::<des::Des>::new_from_slices(des_key, &iv).map_err(|_| {
            Error::EncryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidKeyLength,
            }
        })?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&padded);

        Ok((Bytes::from(ciphertext), Bytes::copy_from_slice(&salt)))
    }

    fn decrypt_des(&self, ciphertext: &[u8], priv_params: &[u8]) -> Result<Bytes> {
        use cbc::cipher::{KeyIvInit, block_padding::NoPadding, BlockDecryptMut};

        let (des_key, pre_iv) = self.des_key_parts()?;

        if priv_params.len() != 8 {
            return Err(Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidPrivParamsLength {
                    expected: 8,
                    actual: priv_params.len(),
                },
            });
        }
        if ciphertext.is_empty() || ciphertext.len() % 8 != 0 {
            return Err(Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidCiphertextLength {
                    length: ciphertext.len(),
                    block_size: 8,
                },
            });
        }

        let mut iv = [0u8; 8];
        for i in 0..8 {
            iv[i] = pre_iv[i] ^ priv_params[i];
        }

        let cipher = cbc::Decryptor::<des::Des>::new_from_slices(des_key, &iv).map_err(|_| {
            Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidKeyLength,
            }
        })?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidCiphertextLength {
                    length: ciphertext.len(),
                    block_size: 8,
                },
            })?;

        Ok(Bytes::from(plaintext))
    }

    /// AES-128-CFB (RFC 3826). Salt: 64-bit counter; IV: boots || time ||
    /// salt (concatenated, not XORed).
    fn encrypt_aes(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salts: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

        let salt = salts.next().to_be_bytes();
        let iv = aes_iv(engine_boots, engine_time, &salt);

        let cipher = cfb_mode::Encryptor::<aes::Aes128>::new_from_slices(&self.key, &iv)
            .map_err(|_| Error::EncryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidKeyLength,
            })?;

        let mut data = plaintext.to_vec();
        cipher.encrypt(&mut data);

        Ok((Bytes::from(data), Bytes::copy_from_slice(&salt)))
    }

    fn decrypt_aes(
        &self,
        ciphertext: &[u8],
        priv_params: &[u8],
        engine_boots: u32,
        engine_time: u32,
    ) -> Result<Bytes> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

        if priv_params.len() != 8 {
            return Err(Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidPrivParamsLength {
                    expected: 8,
                    actual: priv_params.len(),
                },
            });
        }

        let mut salt = [0u8; 8];
        salt.copy_from_slice(priv_params);
        let iv = aes_iv(engine_boots, engine_time, &salt);

        let cipher = cfb_mode::Decryptor::<aes::Aes128>::new_from_slices(&self.key, &iv)
            .map_err(|_| Error::DecryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidKeyLength,
            })?;

        let mut data = ciphertext.to_vec();
        cipher.decrypt(&mut data);

        Ok(Bytes::from(data))
    }

    fn des_key_parts(&self) -> Result<(&[u8], &[u8])> {
        if self.key.len() < 16 {
            return Err(Error::EncryptionFailed {
                target: None,
                kind: CryptoErrorKind::InvalidKeyLength,
            });
        }
        Ok((&self.key[..8], &self.key[8..16]))
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(salt);
    iv
}

/// Monotonic salt source for privacy parameters, seeded from the OS
/// random source. Zero is skipped so a salt never degenerates.
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Counter seeded from `getrandom`.
    pub fn new() -> Self {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).expect("OS random source unavailable");
        Self(AtomicU64::new(u64::from_ne_bytes(buf)))
    }

    /// Next salt value, never zero.
    pub fn next(&self) -> u64 {
        loop {
            let v = self.0.fetch_add(1, Ordering::Relaxed);
            if v != 0 {
                return v;
            }
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}
