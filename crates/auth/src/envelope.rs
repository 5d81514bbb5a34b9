//! Encrypted payload envelopes.
//!
//! Mutating requests may replace their plain JSON body with
//! `{ "encrypted": <armored> }`. The armored message is a base64 JSON
//! envelope: an ephemeral secp256k1 public key, an XChaCha20-Poly1305 nonce,
//! and the ciphertext. The content key is SHA-256 of the ECDH shared secret
//! between the ephemeral key and the server's long-lived envelope key.
//!
//! The server key is kept passphrase-protected at rest: the scalar is sealed
//! under an argon2id-derived key (`export_sealed`/`import_sealed`).

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use registra_core::{AppError, AppResult};

const NONCE_LEN: usize = 24;
const SALT_LEN: usize = 16;

#[derive(serde::Serialize, serde::Deserialize)]
struct EnvelopeWire {
    epk: String,
    nonce: String,
    ct: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SealedKeyWire {
    salt: String,
    nonce: String,
    ct: String,
}

/// The server-held asymmetric envelope key.
pub struct EnvelopeKey {
    secret: SecretKey,
}

impl EnvelopeKey {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut rand::rngs::OsRng),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Decrypt an armored envelope. Any malformation or authentication
    /// failure collapses into one validation error (local decrypt failures
    /// are a fixed 4xx at the gateway).
    pub fn open(&self, armored: &str) -> AppResult<Vec<u8>> {
        let bad = || AppError::validation("invalid encrypted envelope");

        let raw = B64.decode(armored.trim()).map_err(|_| bad())?;
        let wire: EnvelopeWire = serde_json::from_slice(&raw).map_err(|_| bad())?;

        let epk_bytes = B64.decode(&wire.epk).map_err(|_| bad())?;
        let epk = PublicKey::from_sec1_bytes(&epk_bytes).map_err(|_| bad())?;
        let nonce = B64.decode(&wire.nonce).map_err(|_| bad())?;
        let ct = B64.decode(&wire.ct).map_err(|_| bad())?;
        if nonce.len() != NONCE_LEN {
            return Err(bad());
        }

        let shared =
            k256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), epk.as_affine());
        let mut key = content_key(shared.raw_secret_bytes().as_slice());

        let result = XChaCha20Poly1305::new(Key::from_slice(&key))
            .decrypt(XNonce::from_slice(&nonce), ct.as_slice())
            .map_err(|_| bad());
        key.zeroize();
        result
    }

    /// Encrypt `plaintext` to a recipient's public envelope key.
    ///
    /// The gateway never calls this; it exists for clients and tests.
    pub fn seal_for(recipient: &PublicKey, plaintext: &[u8]) -> AppResult<String> {
        let ephemeral = k256::ecdh::EphemeralSecret::random(&mut rand::rngs::OsRng);
        let epk = ephemeral.public_key();
        let shared = ephemeral.diffie_hellman(recipient);
        let mut key = content_key(shared.raw_secret_bytes().as_slice());

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ct = XChaCha20Poly1305::new(Key::from_slice(&key))
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| AppError::internal(format!("envelope encryption failed: {e}")));
        key.zeroize();

        let wire = EnvelopeWire {
            epk: B64.encode(epk.to_encoded_point(true).as_bytes()),
            nonce: B64.encode(nonce),
            ct: B64.encode(ct?),
        };
        let json = serde_json::to_vec(&wire)
            .map_err(|e| AppError::internal(format!("envelope encoding failed: {e}")))?;
        Ok(B64.encode(json))
    }

    /// Seal the private scalar under a passphrase for storage at rest.
    pub fn export_sealed(&self, passphrase: &str) -> AppResult<String> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut key = passphrase_key(passphrase, &salt)?;
        let mut scalar = self.secret.to_bytes();

        let ct = XChaCha20Poly1305::new(Key::from_slice(&key))
            .encrypt(XNonce::from_slice(&nonce), scalar.as_slice())
            .map_err(|e| AppError::internal(format!("key sealing failed: {e}")));
        key.zeroize();
        scalar.zeroize();

        let wire = SealedKeyWire {
            salt: B64.encode(salt),
            nonce: B64.encode(nonce),
            ct: B64.encode(ct?),
        };
        let json = serde_json::to_vec(&wire)
            .map_err(|e| AppError::internal(format!("key encoding failed: {e}")))?;
        Ok(B64.encode(json))
    }

    /// Unseal a key exported with [`EnvelopeKey::export_sealed`].
    pub fn import_sealed(armored: &str, passphrase: &str) -> AppResult<Self> {
        let bad = || AppError::internal("unable to unseal envelope key (wrong passphrase?)");

        let raw = B64.decode(armored.trim()).map_err(|_| bad())?;
        let wire: SealedKeyWire = serde_json::from_slice(&raw).map_err(|_| bad())?;
        let salt = B64.decode(&wire.salt).map_err(|_| bad())?;
        let nonce = B64.decode(&wire.nonce).map_err(|_| bad())?;
        let ct = B64.decode(&wire.ct).map_err(|_| bad())?;
        if nonce.len() != NONCE_LEN {
            return Err(bad());
        }

        let mut key = passphrase_key(passphrase, &salt)?;
        let scalar = XChaCha20Poly1305::new(Key::from_slice(&key))
            .decrypt(XNonce::from_slice(&nonce), ct.as_slice())
            .map_err(|_| bad());
        key.zeroize();
        let mut scalar = scalar?;

        let secret = SecretKey::from_slice(&scalar).map_err(|_| bad());
        scalar.zeroize();
        Ok(Self { secret: secret? })
    }
}

fn content_key(shared: &[u8]) -> [u8; 32] {
    Sha256::digest(shared).into()
}

fn passphrase_key(passphrase: &str, salt: &[u8]) -> AppResult<[u8; 32]> {
    let mut key = [0u8; 32];
    argon2::Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| AppError::internal(format!("key derivation failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let key = EnvelopeKey::generate();
        let armored =
            EnvelopeKey::seal_for(&key.public_key(), br#"{"email":"ada@uni.edu"}"#).unwrap();
        let plain = key.open(&armored).unwrap();
        assert_eq!(plain, br#"{"email":"ada@uni.edu"}"#);
    }

    #[test]
    fn wrong_recipient_key_fails_closed() {
        let intended = EnvelopeKey::generate();
        let other = EnvelopeKey::generate();
        let armored = EnvelopeKey::seal_for(&intended.public_key(), b"secret").unwrap();

        let err = other.open(&armored).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn garbage_armor_is_a_validation_error() {
        let key = EnvelopeKey::generate();
        assert!(key.open("not base64 at all!").is_err());
        assert!(key.open(&B64.encode(b"not an envelope")).is_err());
    }

    #[test]
    fn sealed_export_round_trips_with_passphrase() {
        let key = EnvelopeKey::generate();
        let sealed = key.export_sealed("correct horse").unwrap();

        let restored = EnvelopeKey::import_sealed(&sealed, "correct horse").unwrap();
        let armored = EnvelopeKey::seal_for(&key.public_key(), b"payload").unwrap();
        assert_eq!(restored.open(&armored).unwrap(), b"payload");

        assert!(EnvelopeKey::import_sealed(&sealed, "wrong passphrase").is_err());
    }
}
