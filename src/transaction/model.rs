use chrono::Utc;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{Address, SignatureEngine};
use crate::error::{LedgerError, Result, StructuralError};
use crate::hash::Hash256;

/// A value transfer between two addresses.
///
/// `from == None` marks a coinbase (mining reward) which needs no signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Option<Address>,
    pub to: Address,
    pub amount: u64,
    pub timestamp: i64, // Unix timestamp in milliseconds (UTC)
    /// Hex-encoded DER ECDSA signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Transaction {
    /// Build an unsigned transfer stamped with the current time.
    pub fn new(from: Address, to: Address, amount: u64) -> Self {
        Self {
            from: Some(from),
            to,
            amount,
            timestamp: Utc::now().timestamp_millis(),
            signature: None,
        }
    }

    /// Reward transaction paid out of thin air.
    pub fn coinbase(to: Address, amount: u64) -> Self {
        Self {
            from: None,
            to,
            amount,
            timestamp: Utc::now().timestamp_millis(),
            signature: None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.from.is_none()
    }

    /// SHA-256 over sender, recipient, amount and timestamp.
    /// The signature is not part of the preimage.
    pub fn compute_digest(&self) -> Hash256 {
        let from = self.from.as_ref().map_or("", Address::as_str);
        let preimage = format!("{}:{}:{}:{}", from, self.to, self.amount, self.timestamp);
        Hash256::digest(preimage.as_bytes())
    }

    /// Sign with `sk`, which must belong to `from`.
    pub fn sign(&mut self, engine: &SignatureEngine, sk: &SecretKey) -> Result<()> {
        let Some(from) = &self.from else {
            return Err(LedgerError::Authorization {
                expected: "coinbase".to_string(),
                actual: engine.address_of(sk),
            });
        };
        let signature = engine.sign(sk, from, &self.compute_digest())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Check the signature against a freshly computed digest.
    ///
    /// Coinbase transactions are always valid. A missing signature or
    /// timestamp is a structural error rather than `Ok(false)`.
    pub fn is_valid(&self, engine: &SignatureEngine) -> Result<bool> {
        let Some(from) = &self.from else {
            return Ok(true);
        };
        let signature = match self.signature.as_deref() {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(StructuralError::MissingSignature.into()),
        };
        if self.timestamp <= 0 {
            return Err(StructuralError::MissingTimestamp.into());
        }
        Ok(engine.verify(from, &self.compute_digest(), signature))
    }
}
