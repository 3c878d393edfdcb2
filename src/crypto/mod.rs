use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::hash::Hash256;

/// Identifies a party on the ledger.
/// For anyone able to sign this is the hex of the compressed public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Address (hex of compressed pubkey) for the given public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(hex::encode(pk.serialize()))
    }

    /// Parse the address back into a public key, if it is one.
    pub fn to_public_key(&self) -> Option<PublicKey> {
        let bytes = hex::decode(&self.0).ok()?;
        PublicKey::from_slice(&bytes).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Signs and verifies transaction digests on secp256k1.
///
/// Holds a single context with signing and verification capabilities.
/// Callers pass it to anything that signs or verifies.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    secp: Secp256k1<All>,
}

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureEngine {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn parse_secret_key(&self, sk_hex: &str) -> Result<SecretKey> {
        let bytes = hex::decode(sk_hex.trim())
            .map_err(|_| LedgerError::Key(secp256k1::Error::InvalidSecretKey))?;
        Ok(SecretKey::from_slice(&bytes)?)
    }

    pub fn public_key(&self, sk: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, sk)
    }

    pub fn address_of(&self, sk: &SecretKey) -> Address {
        Address::from_public_key(&self.public_key(sk))
    }

    /// Sign `digest` on behalf of `expected`, returning a hex DER signature.
    /// Fails if `sk` does not belong to `expected`.
    pub fn sign(&self, sk: &SecretKey, expected: &Address, digest: &Hash256) -> Result<String> {
        let actual = self.address_of(sk);
        if &actual != expected {
            return Err(LedgerError::Authorization {
                expected: expected.to_string(),
                actual,
            });
        }
        let msg = Message::from_digest(*digest.as_bytes());
        let sig = self.secp.sign_ecdsa(&msg, sk);
        Ok(hex::encode(sig.serialize_der().to_vec()))
    }

    /// Verify a hex DER signature over `digest` for `signer`.
    /// Malformed input of any kind is simply reported as `false`.
    pub fn verify(&self, signer: &Address, digest: &Hash256, sig_hex: &str) -> bool {
        let Some(pk) = signer.to_public_key() else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(sig_hex) else {
            return false;
        };
        let Ok(sig) = Signature::from_der(&sig_bytes) else {
            return false;
        };
        let msg = Message::from_digest(*digest.as_bytes());
        self.secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
    }
}
