use ring::hmac;
use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;
use tracing::error;

use crate::database::Transaction;

#[derive(Debug)]
pub enum CryptoError {
    Serialization(serde_json::Error),
    Base64Error(base64::DecodeError),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CryptoError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CryptoError::Base64Error(e) => write!(f, "Base64 error: {}", e),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::Base64Error(err)
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Serialization(err)
    }
}

// Fields covered by a ledger signature. `message` and `created_at` are
// presentation only and may change without invalidating the entry.
#[derive(Serialize)]
struct SignedFields<'a> {
    id: &'a str,
    from_user: &'a str,
    to_user: &'a str,
    amount: i64,
    transaction_type: &'a str,
    reference_id: Option<&'a str>,
    timestamp_unix: i64,
}

impl<'a> From<&'a Transaction> for SignedFields<'a> {
    fn from(tx: &'a Transaction) -> Self {
        SignedFields {
            id: &tx.id,
            from_user: &tx.from_user,
            to_user: &tx.to_user,
            amount: tx.amount,
            transaction_type: &tx.transaction_type,
            reference_id: tx.reference_id.as_deref(),
            timestamp_unix: tx.timestamp_unix,
        }
    }
}

/// HMAC-SHA256 signer for ledger entries.
pub struct LedgerSigner {
    key: hmac::Key,
}

impl LedgerSigner {
    pub fn new(secret: &str) -> Self {
        LedgerSigner {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    pub fn sign_transaction(&self, transaction: &Transaction) -> Result<String, CryptoError> {
        let canonical = serde_json::to_vec(&SignedFields::from(transaction))?;
        let tag = hmac::sign(&self.key, &canonical);
        Ok(general_purpose::STANDARD.encode(tag.as_ref()))
    }

    pub fn verify_transaction(&self, transaction: &Transaction) -> bool {
        match self._verify_transaction(transaction) {
            Ok(valid) => valid,
            Err(e) => {
                error!("Signature verification error for {}: {}", transaction.id, e);
                false
            }
        }
    }

    fn _verify_transaction(&self, transaction: &Transaction) -> Result<bool, CryptoError> {
        let canonical = serde_json::to_vec(&SignedFields::from(transaction))?;
        let signature = general_purpose::STANDARD.decode(&transaction.signature)?;

        Ok(hmac::verify(&self.key, &canonical, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Transaction {
        Transaction {
            id: "tx-1".to_string(),
            from_user: "10".to_string(),
            to_user: "20".to_string(),
            amount: 100,
            transaction_type: "loan".to_string(),
            message: Some("first click".to_string()),
            reference_id: Some("offer-1".to_string()),
            signature: String::new(),
            timestamp_unix: 1_700_000_000,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn signed_transaction_verifies() {
        let signer = LedgerSigner::new("secret");
        let mut tx = sample();
        tx.signature = signer.sign_transaction(&tx).unwrap();

        assert!(signer.verify_transaction(&tx));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let signer = LedgerSigner::new("secret");
        let mut tx = sample();
        tx.signature = signer.sign_transaction(&tx).unwrap();
        tx.amount = 10_000;

        assert!(!signer.verify_transaction(&tx));
    }

    #[test]
    fn other_key_and_garbage_signatures_fail() {
        let signer = LedgerSigner::new("secret");
        let mut tx = sample();
        tx.signature = LedgerSigner::new("other").sign_transaction(&tx).unwrap();
        assert!(!signer.verify_transaction(&tx));

        tx.signature = "not base64!!".to_string();
        assert!(!signer.verify_transaction(&tx));
    }

    #[test]
    fn message_is_not_covered() {
        let signer = LedgerSigner::new("secret");
        let mut tx = sample();
        tx.signature = signer.sign_transaction(&tx).unwrap();
        tx.message = None;

        assert!(signer.verify_transaction(&tx));
    }
}
