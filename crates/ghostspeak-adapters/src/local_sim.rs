//! LocalSim backend: in-process implementations of every capability.
//!
//! Used by tests and offline mode. It provides:
//!
//! - **[`LocalSimKeyValueStore`]** DashMap cache with lazily evaluated expiry
//! - **[`LocalSimBlobStore`]** blake3 content addressing, `ghost://<hex>`
//! - **[`LocalSimChain`]** records submitted operations, rejects on demand
//! - **[`LocalSimSigner`]** passphrase-checked wallets returning opaque key handles

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ghostspeak_types::Address;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::traits::{
    AdapterError, BlobStore, ChainAdapter, Confirmation, KeyValueStore, LedgerOperation, Signer,
    SigningKeyHandle,
};

/// URI scheme for LocalSim blobs
pub const BLOB_SCHEME: &str = "ghost://";

// ── LocalSim Key-Value Store ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// In-memory key-value store. Expired entries are dropped when next touched.
#[derive(Debug, Default)]
pub struct LocalSimKeyValueStore {
    entries: DashMap<String, StoredValue>,
}

impl LocalSimKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for LocalSimKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            debug!(key, "expired entry evicted");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), AdapterError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<(), AdapterError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AdapterError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map_or(false, |(_, v)| !v.is_expired(now)))
    }

    async fn keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, AdapterError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── LocalSim Blob Store ───────────────────────────────────────────────────────

/// Content-addressed blob store: `uri = "ghost://" + blake3(json bytes)`.
#[derive(Debug, Default)]
pub struct LocalSimBlobStore {
    blobs: DashMap<String, serde_json::Value>,
}

impl LocalSimBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content URI a document would be stored under
    pub fn content_uri(document: &serde_json::Value) -> Result<String, AdapterError> {
        let bytes = serde_json::to_vec(document)?;
        Ok(format!("{}{}", BLOB_SCHEME, blake3::hash(&bytes).to_hex()))
    }
}

#[async_trait]
impl BlobStore for LocalSimBlobStore {
    async fn put(&self, document: &serde_json::Value) -> Result<String, AdapterError> {
        let uri = Self::content_uri(document)?;
        self.blobs.insert(uri.clone(), document.clone());
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> Result<serde_json::Value, AdapterError> {
        if !uri.starts_with(BLOB_SCHEME) {
            return Err(AdapterError::NotFound(format!("unsupported uri {}", uri)));
        }
        self.blobs
            .get(uri)
            .map(|doc| doc.clone())
            .ok_or_else(|| AdapterError::NotFound(uri.to_string()))
    }
}

// ── LocalSim Chain ────────────────────────────────────────────────────────────

/// In-process ledger stand-in.
///
/// Confirms every operation unless its kind has been marked for rejection.
#[derive(Debug, Default)]
pub struct LocalSimChain {
    /// signature -> operation
    submitted: DashMap<String, LedgerOperation>,
    /// operation kind -> rejection reason
    rejections: DashMap<String, String>,
    accounts: DashMap<Address, serde_json::Value>,
}

impl LocalSimChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every future operation of `kind`
    pub fn reject_kind(&self, kind: impl Into<String>, reason: impl Into<String>) {
        self.rejections.insert(kind.into(), reason.into());
    }

    /// Seed the raw state returned by `query`
    pub fn set_account_state(&self, address: Address, state: serde_json::Value) {
        self.accounts.insert(address, state);
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    pub fn submitted(&self, signature: &str) -> Option<LedgerOperation> {
        self.submitted.get(signature).map(|op| op.clone())
    }
}

#[async_trait]
impl ChainAdapter for LocalSimChain {
    async fn submit(&self, operation: LedgerOperation) -> Result<Confirmation, AdapterError> {
        if let Some(reason) = self.rejections.get(&operation.kind) {
            warn!(kind = %operation.kind, reason = %reason.value(), "operation rejected");
            return Err(AdapterError::RejectedByLedger(reason.clone()));
        }
        let signature = format!("sim_{}", Ulid::new());
        debug!(kind = %operation.kind, signature = %signature, "operation confirmed");
        self.submitted.insert(signature.clone(), operation);
        Ok(Confirmation {
            signature,
            confirmed_at: Utc::now(),
        })
    }

    async fn query(&self, address: &Address) -> Result<serde_json::Value, AdapterError> {
        self.accounts
            .get(address)
            .map(|state| state.clone())
            .ok_or_else(|| AdapterError::NotFound(address.to_string()))
    }
}

// ── LocalSim Signer ───────────────────────────────────────────────────────────

/// Passphrase-checked wallet vault.
///
/// Stores `blake3::derive_key(context, passphrase)` per wallet, never the passphrase.
#[derive(Debug, Default)]
pub struct LocalSimSigner {
    wallets: DashMap<String, [u8; 32]>,
}

impl LocalSimSigner {
    const PASSPHRASE_CONTEXT: &'static str = "ghostspeak local-sim wallet passphrase";
    const KEY_ID_CONTEXT: &'static str = "ghostspeak local-sim key id";

    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a wallet
    pub fn register(&self, wallet_id: impl Into<String>, passphrase: &str) {
        let digest = blake3::derive_key(Self::PASSPHRASE_CONTEXT, passphrase.as_bytes());
        self.wallets.insert(wallet_id.into(), digest);
    }
}

#[async_trait]
impl Signer for LocalSimSigner {
    async fn sign(&self, wallet_id: &str, passphrase: &str) -> Result<SigningKeyHandle, AdapterError> {
        let stored = self
            .wallets
            .get(wallet_id)
            .map(|d| *d)
            .ok_or_else(|| AdapterError::AuthFailed(format!("unknown wallet {}", wallet_id)))?;
        let digest = blake3::derive_key(Self::PASSPHRASE_CONTEXT, passphrase.as_bytes());
        // blake3::Hash comparison is constant-time.
        if blake3::Hash::from(stored) != blake3::Hash::from(digest) {
            warn!(wallet_id, "wallet unlock failed");
            return Err(AdapterError::AuthFailed(format!("wrong passphrase for {}", wallet_id)));
        }

        let key_id = blake3::derive_key(Self::KEY_ID_CONTEXT, wallet_id.as_bytes());
        let key_hex = blake3::Hash::from(key_id).to_hex();
        Ok(SigningKeyHandle {
            wallet_id: wallet_id.to_string(),
            key_id: format!("key_{}", &key_hex.as_str()[..16]),
            unlocked_at: Utc::now(),
        })
    }
}

// ── LocalSim Factory ──────────────────────────────────────────────────────────

/// The full LocalSim capability set.
#[derive(Debug, Clone, Default)]
pub struct LocalSim {
    pub kv: Arc<LocalSimKeyValueStore>,
    pub blobs: Arc<LocalSimBlobStore>,
    pub chain: Arc<LocalSimChain>,
    pub signer: Arc<LocalSimSigner>,
}

impl LocalSim {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ghostspeak_types::{ErrorCategory, GhostSpeakError};
    use serde_json::json;

    #[tokio::test]
    async fn test_kv_set_get_delete() {
        let kv = LocalSimKeyValueStore::new();
        kv.set("escrow:1", "{}".to_string()).await.unwrap();
        assert_eq!(kv.get("escrow:1").await.unwrap(), Some("{}".to_string()));
        assert!(kv.delete("escrow:1").await.unwrap());
        assert!(!kv.delete("escrow:1").await.unwrap());
        assert_eq!(kv.get("escrow:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_kv_expiry_is_lazy() {
        let kv = LocalSimKeyValueStore::new();
        kv.set_with_expiry("session", "x".to_string(), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(kv.get("session").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(kv.keys_by_prefix("sess").await.unwrap(), Vec::<String>::new());
        assert_eq!(kv.get("session").await.unwrap(), None);
        assert!(kv.entries.is_empty());
    }

    #[tokio::test]
    async fn test_kv_keys_by_prefix_sorted() {
        let kv = LocalSimKeyValueStore::new();
        for key in ["vote:b", "vote:a", "proposal:a"] {
            kv.set(key, String::new()).await.unwrap();
        }
        assert_eq!(kv.keys_by_prefix("vote:").await.unwrap(), vec!["vote:a", "vote:b"]);
    }

    #[tokio::test]
    async fn test_blob_content_addressing() {
        let blobs = LocalSimBlobStore::new();
        let doc = json!({ "name": "summarizer", "capabilities": ["text"] });
        let uri = blobs.put(&doc).await.unwrap();
        assert!(uri.starts_with("ghost://"));
        assert_eq!(uri.len(), BLOB_SCHEME.len() + 64);
        assert_eq!(blobs.put(&doc).await.unwrap(), uri);
        assert_eq!(blobs.get(&uri).await.unwrap(), doc);

        let err = blobs.get("ghost://missing").await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_chain_submit_and_reject() {
        let chain = LocalSimChain::new();
        let confirmation = chain
            .submit(LedgerOperation::new("escrow.fund", json!({ "amount": 1_000_000 })))
            .await
            .unwrap();
        assert!(confirmation.signature.starts_with("sim_"));
        assert_eq!(chain.submitted_count(), 1);
        assert!(chain.submitted(&confirmation.signature).is_some());

        chain.reject_kind("staking.stake", "insufficient balance");
        let err = chain
            .submit(LedgerOperation::new("staking.stake", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::RejectedByLedger("insufficient balance".to_string()));
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_chain_query() {
        let chain = LocalSimChain::new();
        let address = Address::parse(&"Q".repeat(32)).unwrap();
        assert!(matches!(
            chain.query(&address).await,
            Err(AdapterError::NotFound(_))
        ));
        chain.set_account_state(address.clone(), json!({ "lamports": 5 }));
        assert_eq!(chain.query(&address).await.unwrap()["lamports"], 5);
    }

    #[tokio::test]
    async fn test_signer_checks_passphrase() {
        let signer = LocalSimSigner::new();
        signer.register("main", "correct horse");

        let handle = signer.sign("main", "correct horse").await.unwrap();
        assert_eq!(handle.wallet_id, "main");
        assert!(handle.key_id.starts_with("key_"));
        // Stable across unlocks
        assert_eq!(signer.sign("main", "correct horse").await.unwrap().key_id, handle.key_id);

        let err = signer.sign("main", "wrong").await.unwrap_err();
        assert!(matches!(err, AdapterError::AuthFailed(_)));
        assert!(signer.sign("other", "correct horse").await.is_err());
    }

    #[test]
    fn test_adapter_error_maps_to_capability() {
        let err: GhostSpeakError = AdapterError::Timeout("rpc".into()).into();
        assert_eq!(err.category(), ErrorCategory::Capability);
        assert!(err.is_retriable());

        let err: GhostSpeakError = AdapterError::AuthFailed("main".into()).into();
        assert!(!err.is_retriable());
    }
}
