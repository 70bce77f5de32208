//! Hashing, signing, and address derivation.
//!
//! Signatures and public keys are raw hex, never DER or Base58: a public
//! key is the 33-byte SEC1-compressed point, a signature is the 64-byte
//! fixed-width `r || s` encoding, and an address is the hex SHA-256 of the
//! public key's raw bytes.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Generates a new SECP256k1 key pair, returning `(private_key_hex, public_key_hex)`.
pub fn generate_keypair() -> (String, String) {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = *signing_key.verifying_key();
    let priv_hex = hex::encode(signing_key.to_bytes());
    let pub_hex = hex::encode(verifying_key.to_encoded_point(true).as_bytes());
    (priv_hex, pub_hex)
}

/// Signs `sha256(message)` with the given private key, returning a raw hex signature.
pub fn sign(priv_hex: &str, message: &str) -> Option<String> {
    let priv_bytes = hex::decode(priv_hex).ok()?;
    let signing_key = SigningKey::from_bytes(priv_bytes.as_slice().into()).ok()?;
    let digest = Sha256::digest(message.as_bytes());
    let signature: Signature = signing_key.sign(&digest);
    Some(hex::encode(signature.to_bytes()))
}

/// Verifies a raw hex signature over `sha256(message)` under the given public key.
pub fn verify(pub_hex: &str, message: &str, sig_hex: &str) -> bool {
    let verify_inner = || -> Option<bool> {
        let pub_bytes = hex::decode(pub_hex).ok()?;
        let verifying_key = VerifyingKey::from_sec1_bytes(&pub_bytes).ok()?;
        let sig_bytes = hex::decode(sig_hex).ok()?;
        let signature = Signature::from_slice(&sig_bytes).ok()?;
        let digest = Sha256::digest(message.as_bytes());
        Some(verifying_key.verify(&digest, &signature).is_ok())
    };
    verify_inner().unwrap_or(false)
}

/// Derives an address (64 hex chars) from a raw public-key hex string.
pub fn public_key_to_address(pub_hex: &str) -> String {
    let pub_bytes = hex::decode(pub_hex).unwrap_or_default();
    sha256_hex(&pub_bytes)
}

/// Computes the Merkle root over an ordered list of hex transaction ids.
///
/// Concatenation happens over the hex *strings* at every level, not over
/// raw digest bytes; an odd-sized level duplicates its last element.
pub fn merkle_root(tx_ids: &[String]) -> String {
    if tx_ids.is_empty() {
        return sha256_hex(b"");
    }

    let mut level: Vec<String> = tx_ids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level.last().unwrap().clone();
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| sha256_hex(format!("{}{}", pair[0], pair[1]).as_bytes()))
            .collect();
    }
    level.into_iter().next().unwrap()
}
