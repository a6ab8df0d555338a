//! GhostSpeak Adapters - the isolation layer between the rules engines and the
//! outside world.
//!
//! This crate has two roles:
//!
//! 1. **Stable capability traits** ([`traits`]), the only surface through which
//!    the bookkeeping layer reaches a wallet, the ledger, blob storage or the
//!    local cache.
//!
//! 2. **LocalSim backends** ([`local_sim`]), in-process implementations of
//!    every capability for tests and offline mode.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ghostspeak-sdk (RecordBook)                              │
//! │      │ KeyValueStore            │ Signer / ChainAdapter   │
//! │  ════╪══════════ CAPABILITY BOUNDARY ══╪═════════════════ │
//! │      ▼                                 ▼                  │
//! │  LocalSim* (tests, offline)   ledger RPC, wallet vault    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod traits;
pub mod local_sim;

pub use traits::{
    AdapterError, BlobStore, ChainAdapter, Confirmation, KeyValueStore, LedgerOperation, Signer,
    SigningKeyHandle,
};
pub use local_sim::{
    LocalSim, LocalSimBlobStore, LocalSimChain, LocalSimKeyValueStore, LocalSimSigner,
    BLOB_SCHEME,
};
