//! Caller-supplied signing seam for payment authorizations.
//!
//! The protocol client never holds key material itself; it asks a
//! `PaymentSigner` for signatures. Settlement-network signature scheme
//! internals stay behind this trait.

use agora_types::{AgoraError, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;

#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Settlement-network address of the paying account.
    fn address(&self) -> String;

    /// Sign an authorization message; returns the hex-encoded signature.
    async fn sign_message(&self, message: &[u8]) -> Result<String>;
}

/// In-process signer backed by a locally held keypair. Used by the node
/// when no external wallet is attached.
pub struct LocalSigner {
    key: SigningKey,
    address: String,
}

impl LocalSigner {
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        Self::from_key(key)
    }

    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| AgoraError::Signing(format!("invalid key hex: {}", e)))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AgoraError::Signing("key must be 32 bytes".to_string()))?;
        Ok(Self::from_key(SigningKey::from_bytes(&seed)))
    }

    fn from_key(key: SigningKey) -> Self {
        // Address is derived from the verifying key; 20 bytes keeps it
        // shaped like the registry's account addresses.
        let verifying = key.verifying_key();
        let address = format!("0x{}", hex::encode(&verifying.to_bytes()[..20]));
        Self { key, address }
    }
}

#[async_trait]
impl PaymentSigner for LocalSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        let signature = self.key.sign(message);
        Ok(format!("0x{}", hex::encode(signature.to_bytes())))
    }
}
