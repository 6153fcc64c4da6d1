//! Field-level encryption: a `FieldCipher` per supported algorithm, a
//! stable wire envelope, and the key-rotation bulk operation. AES-256-GCM
//! and ChaCha20-Poly1305 cover the common AEAD case; AES-256-CBC+HMAC
//! exists for reading records written before a migration to one of those.
//!
//! Database-level (at-rest) encryption is delegated to the backend
//! entirely; the engine only carries its configuration through.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AesOsRng};
use aes_gcm::{Aes256Gcm, Key as Aes256Key, Nonce as Aes256Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{
    Aead as ChaChaAead, AeadCore as ChaChaAeadCore, KeyInit as ChaChaKeyInit, OsRng as ChaChaOsRng,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use ripple_core::{CryptoError, RippleError, RippleResult};
use ripple_storage::Backend;

/// Which algorithm produced a given ciphertext envelope; carried as the
/// `<version>` segment of the wire format so a reader can decrypt without
/// being told the algorithm out of band.
pub const VERSION_AES256_GCM: u16 = 1;
pub const VERSION_CHACHA20_POLY1305: u16 = 2;
pub const VERSION_AES256_CBC_HMAC_LEGACY: u16 = 3;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Transforms plaintext bytes to an opaque encrypted payload and back.
/// Implementations own their own key material; `version()` identifies the
/// algorithm in the wire envelope so `decrypt_field` can dispatch to the
/// right cipher without the caller tracking which one was used.
pub trait FieldCipher: Send + Sync {
    fn version(&self) -> u16;
    fn algorithm_name(&self) -> &'static str;
    fn encrypt_payload(&self, plaintext: &[u8]) -> RippleResult<Vec<u8>>;
    fn decrypt_payload(&self, payload: &[u8]) -> RippleResult<Vec<u8>>;
}

/// AES-256-GCM, the default algorithm.
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Aes256Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl FieldCipher for Aes256GcmCipher {
    fn version(&self) -> u16 {
        VERSION_AES256_GCM
    }

    fn algorithm_name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn encrypt_payload(&self, plaintext: &[u8]) -> RippleResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut AesOsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|e| {
            RippleError::Crypto(CryptoError::EncryptFailed {
                field: "<field>".into(),
                reason: e.to_string(),
            })
        })?;
        let mut payload = Vec::with_capacity(nonce.len() + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    fn decrypt_payload(&self, payload: &[u8]) -> RippleResult<Vec<u8>> {
        let (nonce_bytes, ciphertext) = split_nonce(payload, 12)?;
        let nonce = Aes256Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| RippleError::Crypto(CryptoError::TagMismatch { field: "<field>".into() }))
    }
}

/// ChaCha20-Poly1305, an alternative AEAD algorithm.
pub struct ChaCha20Poly1305Cipher {
    cipher: ChaCha20Poly1305,
}

impl ChaCha20Poly1305Cipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = ChaChaKey::from_slice(key);
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }
}

impl FieldCipher for ChaCha20Poly1305Cipher {
    fn version(&self) -> u16 {
        VERSION_CHACHA20_POLY1305
    }

    fn algorithm_name(&self) -> &'static str {
        "chacha20-poly1305"
    }

    fn encrypt_payload(&self, plaintext: &[u8]) -> RippleResult<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut ChaChaOsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|e| {
            RippleError::Crypto(CryptoError::EncryptFailed {
                field: "<field>".into(),
                reason: e.to_string(),
            })
        })?;
        let mut payload = Vec::with_capacity(nonce.len() + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    fn decrypt_payload(&self, payload: &[u8]) -> RippleResult<Vec<u8>> {
        let (nonce_bytes, ciphertext) = split_nonce(payload, 12)?;
        let nonce = ChaChaNonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| RippleError::Crypto(CryptoError::TagMismatch { field: "<field>".into() }))
    }
}

/// AES-256-CBC with a separate HMAC-SHA256 for integrity: CBC alone has no
/// authentication tag, so this pairs it with a MAC computed over the
/// ciphertext. Prefer [`Aes256GcmCipher`] for new data; this exists for
/// reading records
/// written before the engine adopted AEAD ciphers.
#[deprecated(note = "AEAD ciphers (Aes256GcmCipher, ChaCha20Poly1305Cipher) should be used for new data")]
pub struct Aes256CbcHmacCipher {
    enc_key: [u8; 32],
    mac_key: [u8; 32],
}

#[allow(deprecated)]
impl Aes256CbcHmacCipher {
    pub fn new(enc_key: [u8; 32], mac_key: [u8; 32]) -> Self {
        Self { enc_key, mac_key }
    }
}

#[allow(deprecated)]
impl FieldCipher for Aes256CbcHmacCipher {
    fn version(&self) -> u16 {
        VERSION_AES256_CBC_HMAC_LEGACY
    }

    fn algorithm_name(&self) -> &'static str {
        "aes-256-cbc-hmac-sha256-legacy"
    }

    fn encrypt_payload(&self, plaintext: &[u8]) -> RippleResult<Vec<u8>> {
        use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
        use rand::RngCore;

        let mut iv = [0u8; 16];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(&self.enc_key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("hmac accepts any key length");
        mac.update(&iv);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut payload = Vec::with_capacity(iv.len() + ciphertext.len() + tag.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);
        payload.extend_from_slice(&tag);
        Ok(payload)
    }

    fn decrypt_payload(&self, payload: &[u8]) -> RippleResult<Vec<u8>> {
        use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

        if payload.len() < 16 + 32 {
            return Err(RippleError::Crypto(CryptoError::MalformedEnvelope {
                field: "<field>".into(),
                reason: "payload shorter than iv + hmac tag".into(),
            }));
        }
        let (iv, rest) = payload.split_at(16);
        let (ciphertext, tag) = rest.split_at(rest.len() - 32);
        let iv: [u8; 16] = iv.try_into().expect("split_at(16) guarantees 16 bytes");

        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("hmac accepts any key length");
        mac.update(&iv);
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| RippleError::Crypto(CryptoError::TagMismatch { field: "<field>".into() }))?;

        Aes256CbcDec::new(&self.enc_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| {
                RippleError::Crypto(CryptoError::MalformedEnvelope {
                    field: "<field>".into(),
                    reason: e.to_string(),
                })
            })
    }
}

fn split_nonce(payload: &[u8], nonce_len: usize) -> RippleResult<(&[u8], &[u8])> {
    if payload.len() < nonce_len {
        return Err(RippleError::Crypto(CryptoError::MalformedEnvelope {
            field: "<field>".into(),
            reason: format!("payload shorter than {nonce_len}-byte nonce"),
        }));
    }
    Ok(payload.split_at(nonce_len))
}

/// Encode `plaintext` with `cipher`, wrapping the result in the wire
/// envelope `enc:<version>:<base64(nonce || ciphertext || tag)>`.
pub fn encrypt_field(cipher: &dyn FieldCipher, plaintext: &[u8]) -> RippleResult<String> {
    let payload = cipher.encrypt_payload(plaintext)?;
    Ok(format!("enc:{}:{}", cipher.version(), BASE64.encode(payload)))
}

/// Decode a wire envelope produced by [`encrypt_field`], decrypting with
/// `cipher`. The envelope's version is checked against `cipher.version()`
/// so a mismatched cipher is rejected rather than silently misdecoded.
pub fn decrypt_field(cipher: &dyn FieldCipher, wire: &str) -> RippleResult<Vec<u8>> {
    let mut parts = wire.splitn(3, ':');
    let (version, body) = match (parts.next(), parts.next(), parts.next()) {
        (Some("enc"), Some(v), Some(b)) => (v, b),
        _ => {
            return Err(RippleError::Crypto(CryptoError::MalformedEnvelope {
                field: "<field>".into(),
                reason: "expected enc:<version>:<base64>".into(),
            }))
        }
    };
    let version: u16 = version.parse().map_err(|_| {
        RippleError::Crypto(CryptoError::MalformedEnvelope {
            field: "<field>".into(),
            reason: "non-numeric version segment".into(),
        })
    })?;
    if version != cipher.version() {
        return Err(RippleError::Crypto(CryptoError::MalformedEnvelope {
            field: "<field>".into(),
            reason: format!("envelope version {version} does not match cipher version {}", cipher.version()),
        }));
    }
    let payload = BASE64.decode(body).map_err(|e| {
        RippleError::Crypto(CryptoError::MalformedEnvelope {
            field: "<field>".into(),
            reason: e.to_string(),
        })
    })?;
    cipher.decrypt_payload(&payload)
}

/// The configured encryption mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EncryptionConfig {
    None,
    /// Delegated entirely to the backend; the engine performs no
    /// encryption itself and only carries the provider/KDF settings
    /// through to whichever backend supports encrypted-at-rest storage.
    DbLevel { key_provider: String, kdf_iterations: u32 },
    /// Performed by the engine at the API/backend boundary for each field
    /// named in `fields`.
    FieldLevel {
        fields: Vec<String>,
        key_provider: String,
        algorithm: FieldAlgorithm,
        version: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAlgorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
    #[allow(non_camel_case_types)]
    Aes256CbcHmacLegacy,
}

/// Rotate the key used for `field` across every record a backend holds
/// locally: decrypt with `old_cipher`, encrypt with `new_cipher`, save.
/// A bulk operation, not a streaming one.
pub async fn rotate_field_key<T: ripple_core::Entity>(
    backend: &dyn Backend<T>,
    field: &str,
    old_cipher: &dyn FieldCipher,
    new_cipher: &dyn FieldCipher,
) -> RippleResult<usize> {
    let items = backend.get_all_local(None).await?;
    let mut rotated = 0usize;
    for item in items {
        let mut json = backend.to_json(&item)?;
        let Some(obj) = json.as_object_mut() else {
            continue;
        };
        let Some(serde_json::Value::String(wire)) = obj.get(field).cloned() else {
            continue;
        };
        let plaintext = decrypt_field(old_cipher, &wire)?;
        let rewrapped = encrypt_field(new_cipher, &plaintext)?;
        obj.insert(field.to_string(), serde_json::Value::String(rewrapped));
        let rewritten = backend.from_json(json)?;
        backend.save_local(&rewritten).await?;
        rotated += 1;
    }
    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_gcm_round_trips() {
        let cipher = Aes256GcmCipher::new(&[7u8; 32]);
        let wire = encrypt_field(&cipher, b"super secret ssn").unwrap();
        assert!(wire.starts_with("enc:1:"));
        let plaintext = decrypt_field(&cipher, &wire).unwrap();
        assert_eq!(plaintext, b"super secret ssn");
    }

    #[test]
    fn chacha_round_trips() {
        let cipher = ChaCha20Poly1305Cipher::new(&[9u8; 32]);
        let wire = encrypt_field(&cipher, b"another secret").unwrap();
        assert!(wire.starts_with("enc:2:"));
        assert_eq!(decrypt_field(&cipher, &wire).unwrap(), b"another secret");
    }

    #[test]
    #[allow(deprecated)]
    fn legacy_cbc_hmac_round_trips() {
        let cipher = Aes256CbcHmacCipher::new([1u8; 32], [2u8; 32]);
        let wire = encrypt_field(&cipher, b"legacy payload").unwrap();
        assert!(wire.starts_with("enc:3:"));
        assert_eq!(decrypt_field(&cipher, &wire).unwrap(), b"legacy payload");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = Aes256GcmCipher::new(&[7u8; 32]);
        let wire = encrypt_field(&cipher, b"tamper me").unwrap();
        let (prefix, b64) = wire.rsplit_once(':').unwrap();
        let mut raw = BASE64.decode(b64).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = format!("{prefix}:{}", BASE64.encode(raw));
        assert!(decrypt_field(&cipher, &tampered).is_err());
    }

    #[test]
    fn mismatched_cipher_version_is_rejected() {
        let aes = Aes256GcmCipher::new(&[1u8; 32]);
        let chacha = ChaCha20Poly1305Cipher::new(&[1u8; 32]);
        let wire = encrypt_field(&aes, b"x").unwrap();
        assert!(decrypt_field(&chacha, &wire).is_err());
    }
}
