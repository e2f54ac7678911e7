//! AES-256-GCM sealing of secret payloads.
//!
//! Every call to [`encrypt`] draws a fresh random nonce from the OS RNG; the
//! nonce travels with the ciphertext and is not secret. Authentication failure
//! on [`decrypt`] is always reported as [`VaultError::Decryption`], never as a
//! different plaintext.

use super::kdf::EncryptionKey;
use crate::error::VaultError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

/// Size of the nonce in bytes (96 bits, standard for GCM)
pub const NONCE_SIZE: usize = 12;

/// Encrypts a payload under `key` with a random nonce.
///
/// # Returns
/// * `Ok((ciphertext, nonce))` - ciphertext includes the 16-byte GCM tag
/// * `Err` - only if the AEAD rejects the input length
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<(Vec<u8>, Vec<u8>), VaultError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Storage(format!("Failed to create cipher: {}", e)))?;

    // Never reuse a nonce under the same key
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VaultError::Storage(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce.to_vec()))
}

/// Decrypts a payload produced by [`encrypt`].
///
/// # Errors
/// * `Decryption` - wrong nonce length, wrong key, truncated or tampered data
pub fn decrypt(ciphertext: &[u8], nonce: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, VaultError> {
    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::Decryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Decryption(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            VaultError::Decryption("authentication failed (wrong key or corrupted data)".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = key(0);
        let payloads: [&[u8]; 4] = [
            b"",
            b"ya29.a0AfH6SMB-access-token",
            &[0u8, 255, 1, 254, 128],
            &[0x42; 4096],
        ];

        for plaintext in payloads {
            let (ciphertext, nonce) = encrypt(plaintext, &key).expect("Encryption failed");
            assert_eq!(nonce.len(), NONCE_SIZE);
            let decrypted = decrypt(&ciphertext, &nonce, &key).expect("Decryption failed");
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let plaintext = b"my-secret-access-token-12345";
        let (ciphertext, _) = encrypt(plaintext, &key(0)).unwrap();
        assert_ne!(&ciphertext[..plaintext.len()], plaintext);
    }

    #[test]
    fn test_different_nonces() {
        let key = key(0);
        let plaintext = b"same-plaintext";

        let (ciphertext1, nonce1) = encrypt(plaintext, &key).unwrap();
        let (ciphertext2, nonce2) = encrypt(plaintext, &key).unwrap();

        assert_ne!(nonce1, nonce2);
        assert_ne!(ciphertext1, ciphertext2);

        assert_eq!(decrypt(&ciphertext1, &nonce1, &key).unwrap(), plaintext);
        assert_eq!(decrypt(&ciphertext2, &nonce2, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ciphertext, nonce) = encrypt(b"secret", &key(0)).unwrap();

        let result = decrypt(&ciphertext, &nonce, &key(1));
        assert!(matches!(result, Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_any_flipped_bit_is_detected() {
        let key = key(3);
        let (ciphertext, nonce) = encrypt(b"refresh-token", &key).unwrap();

        for i in 0..ciphertext.len() * 8 {
            let mut tampered = ciphertext.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            assert!(
                matches!(decrypt(&tampered, &nonce, &key), Err(VaultError::Decryption(_))),
                "ciphertext bit {} flip not detected",
                i
            );
        }

        for i in 0..nonce.len() * 8 {
            let mut tampered = nonce.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            assert!(
                matches!(decrypt(&ciphertext, &tampered, &key), Err(VaultError::Decryption(_))),
                "nonce bit {} flip not detected",
                i
            );
        }
    }

    #[test]
    fn test_truncated_payload_fails() {
        let key = key(0);
        let (ciphertext, nonce) = encrypt(b"secret", &key).unwrap();

        assert!(decrypt(&ciphertext[..ciphertext.len() - 1], &nonce, &key).is_err());
        assert!(decrypt(&[], &nonce, &key).is_err());
        assert!(decrypt(&ciphertext, &nonce[..NONCE_SIZE - 1], &key).is_err());
    }
}
