//! Capability traits, the only surface through which GhostSpeak touches the
//! outside world.
//!
//! Engines never call these. The bookkeeping layer does, and every backend
//! (ledger RPC, wallet vault, IPFS-style blob store, local cache) sits behind
//! one of them, so the [`LocalSim`](crate::local_sim) implementations can
//! stand in for all of them in tests and offline mode.
//!
//! # The four capabilities
//!
//! 1. **[`Signer`]** unlocks a wallet and hands back an opaque key handle
//! 2. **[`ChainAdapter`]** submits and queries opaque ledger operations
//! 3. **[`BlobStore`]** stores JSON metadata by content address
//! 4. **[`KeyValueStore`]** is the local cache with optional per-key expiry

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostspeak_types::{Address, GhostSpeakError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Signer ────────────────────────────────────────────────────────────────────

/// Opaque handle to an unlocked signing key.
///
/// Carries no key material: only the wallet it unlocks and a stable key id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyHandle {
    pub wallet_id: String,
    pub key_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// Wallet custody.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    /// Unlock `wallet_id` with `passphrase`. Fails with [`AdapterError::AuthFailed`].
    async fn sign(&self, wallet_id: &str, passphrase: &str) -> Result<SigningKeyHandle, AdapterError>;
}

// ── Ledger ────────────────────────────────────────────────────────────────────

/// An operation bound for the ledger. The payload is opaque to the client core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOperation {
    /// e.g. "escrow.fund", "staking.stake"
    pub kind: String,
    pub payload: serde_json::Value,
}

impl LedgerOperation {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Ledger acknowledgement of a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Ledger-assigned signature / transaction id
    pub signature: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Ledger transport.
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    /// Submit an operation. Fails with [`AdapterError::Timeout`] or
    /// [`AdapterError::RejectedByLedger`].
    async fn submit(&self, operation: LedgerOperation) -> Result<Confirmation, AdapterError>;

    /// Raw state of an account. Fails with [`AdapterError::NotFound`].
    async fn query(&self, address: &Address) -> Result<serde_json::Value, AdapterError>;
}

// ── Blob storage ──────────────────────────────────────────────────────────────

/// Content-addressed JSON storage for metadata (agent profiles, evidence).
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store a document and return its content URI.
    async fn put(&self, document: &serde_json::Value) -> Result<String, AdapterError>;

    /// Fetch a document by content URI.
    async fn get(&self, uri: &str) -> Result<serde_json::Value, AdapterError>;
}

// ── Key-value store ───────────────────────────────────────────────────────────

/// Local persistence with optional per-key expiry.
///
/// Values are serialized records (JSON text).
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError>;

    async fn set(&self, key: &str, value: String) -> Result<(), AdapterError>;

    /// Store a value that disappears after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<(), AdapterError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, AdapterError>;

    /// Live keys starting with `prefix`, sorted.
    async fn keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, AdapterError>;
}

// ── Error Types ───────────────────────────────────────────────────────────────

/// Errors from capability backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("rejected by ledger: {0}")]
    RejectedByLedger(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AdapterError {
    /// Transient failures a caller may retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, AdapterError::Timeout(_) | AdapterError::Storage(_))
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::Serialization(e.to_string())
    }
}

impl From<AdapterError> for GhostSpeakError {
    fn from(e: AdapterError) -> Self {
        GhostSpeakError::Capability {
            retriable: e.is_retriable(),
            message: e.to_string(),
        }
    }
}
