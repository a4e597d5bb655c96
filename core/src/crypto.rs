//! Fernet-equivalent symmetric authenticated encryption: AES-128-CBC with a
//! random IV, HMAC-SHA256 over the version byte, timestamp, IV and
//! ciphertext, constant-time tag verification on decrypt.
//!
//! Token layout (all big-endian):
//! `version(1) || timestamp(8) || iv(16) || ciphertext(N) || hmac(32)`

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

const VERSION: u8 = 0x80;
const IV_LEN: usize = 16;
const HMAC_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 8;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// A 32-byte key split into a signing half and an encryption half, matching
/// the Fernet key layout: URL-safe base64 of 32 raw bytes.
#[derive(Clone)]
pub struct FernetKey {
    signing_key: [u8; 16],
    encryption_key: [u8; 16],
}

impl FernetKey {
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = base64::engine::general_purpose::URL_SAFE
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        if raw.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(raw.len()));
        }
        let mut signing_key = [0u8; 16];
        let mut encryption_key = [0u8; 16];
        signing_key.copy_from_slice(&raw[..16]);
        encryption_key.copy_from_slice(&raw[16..]);
        Ok(Self { signing_key, encryption_key })
    }

    /// Generates a fresh random key, base64-encoded the same way
    /// [`FernetKey::from_base64`] expects to parse it back.
    pub fn generate() -> String {
        let mut raw = [0u8; 32];
        rand::rng().fill_bytes(&mut raw);
        base64::engine::general_purpose::URL_SAFE.encode(raw)
    }
}

/// Encrypts `plaintext` under `key`, returning a URL-safe-base64 token.
pub fn encrypt(key: &FernetKey, plaintext: &[u8], now_unix: u64) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    let ciphertext = Aes128CbcEnc::new(&key.encryption_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut frame = Vec::with_capacity(HEADER_LEN + ciphertext.len() + HMAC_LEN);
    frame.push(VERSION);
    frame.extend_from_slice(&now_unix.to_be_bytes());
    frame.extend_from_slice(&iv);
    frame.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(&key.signing_key).expect("hmac accepts any key length");
    mac.update(&frame);
    frame.extend_from_slice(&mac.finalize().into_bytes());

    base64::engine::general_purpose::URL_SAFE.encode(frame)
}

/// Decrypts a token produced by [`encrypt`]. Returns the original plaintext,
/// or an error if the token is malformed or the HMAC tag does not match.
pub fn decrypt(key: &FernetKey, token: &str) -> Result<Vec<u8>, CryptoError> {
    let frame = base64::engine::general_purpose::URL_SAFE
        .decode(token)
        .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;

    if frame.len() < HEADER_LEN + HMAC_LEN {
        return Err(CryptoError::TokenTooShort);
    }

    let version = frame[0];
    if version != VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let (signed_part, tag) = frame.split_at(frame.len() - HMAC_LEN);
    let mut mac = HmacSha256::new_from_slice(&key.signing_key).expect("hmac accepts any key length");
    mac.update(signed_part);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(tag).unwrap_u8() != 1 {
        return Err(CryptoError::InvalidSignature);
    }

    let iv = &signed_part[1 + TIMESTAMP_LEN..HEADER_LEN];
    let ciphertext = &signed_part[HEADER_LEN..];

    Aes128CbcDec::new(&key.encryption_key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::InvalidPadding)
}
