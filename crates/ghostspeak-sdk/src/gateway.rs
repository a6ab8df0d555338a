//! Gateway: wallet unlock, ledger submission and metadata storage
//!
//! Submission retries transient failures (timeouts, storage hiccups) with
//! exponential backoff. Authentication failures and ledger rejections are
//! returned on the first attempt.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use ghostspeak_adapters::{
    AdapterError, BlobStore, ChainAdapter, Confirmation, LedgerOperation, LocalSim, Signer,
};
use ghostspeak_types::{Address, Result};

use crate::SubmitConfig;

/// Outbound side of the client: signer, ledger and blob storage
pub struct Gateway {
    signer: Arc<dyn Signer>,
    chain: Arc<dyn ChainAdapter>,
    blobs: Arc<dyn BlobStore>,
    config: SubmitConfig,
}

impl Gateway {
    pub fn new(
        signer: Arc<dyn Signer>,
        chain: Arc<dyn ChainAdapter>,
        blobs: Arc<dyn BlobStore>,
        config: SubmitConfig,
    ) -> Self {
        Self {
            signer,
            chain,
            blobs,
            config,
        }
    }

    /// Gateway over the LocalSim backends
    pub fn local(sim: &LocalSim, config: SubmitConfig) -> Self {
        Self::new(sim.signer.clone(), sim.chain.clone(), sim.blobs.clone(), config)
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Unlock `wallet_id` and submit `payload` as a `kind` operation
    pub async fn submit<P: Serialize>(
        &self,
        wallet_id: &str,
        passphrase: &str,
        kind: &str,
        payload: &P,
    ) -> Result<Confirmation> {
        let key = self.signer.sign(wallet_id, passphrase).await?;
        let operation = LedgerOperation::new(
            kind,
            json!({
                "signer": key.key_id,
                "body": serde_json::to_value(payload)?,
            }),
        );

        let retry = &self.config.retry;
        let mut attempt = 1;
        loop {
            let outcome = tokio::time::timeout(self.config.timeout, self.chain.submit(operation.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(AdapterError::Timeout(format!(
                        "{} after {:?}",
                        kind, self.config.timeout
                    )))
                });

            match outcome {
                Ok(confirmation) => {
                    info!(kind, signature = %confirmation.signature, attempt, "operation confirmed");
                    return Ok(confirmation);
                }
                Err(e) if e.is_retriable() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(kind, attempt, error = %e, ?delay, "submission failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(kind, attempt, error = %e, "submission failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Raw ledger state of an account
    pub async fn account_state(&self, address: &Address) -> Result<serde_json::Value> {
        Ok(self.chain.query(address).await?)
    }

    /// Store a metadata document; returns its content URI
    pub async fn publish_metadata(&self, document: &serde_json::Value) -> Result<String> {
        Ok(self.blobs.put(document).await?)
    }

    pub async fn fetch_metadata(&self, uri: &str) -> Result<serde_json::Value> {
        Ok(self.blobs.get(uri).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryConfig;
    use async_trait::async_trait;
    use ghostspeak_types::{ErrorCategory, GhostSpeakError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config(max_attempts: u32) -> SubmitConfig {
        SubmitConfig {
            timeout: Duration::from_millis(50),
            retry: RetryConfig {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    /// Times out until `failures` attempts have been made
    struct FlakyChain {
        failures: u32,
        attempts: AtomicU32,
        inner: ghostspeak_adapters::LocalSimChain,
    }

    #[async_trait]
    impl ChainAdapter for FlakyChain {
        async fn submit(&self, operation: LedgerOperation) -> std::result::Result<Confirmation, AdapterError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(AdapterError::Timeout(format!("attempt {}", attempt)));
            }
            self.inner.submit(operation).await
        }

        async fn query(&self, address: &Address) -> std::result::Result<serde_json::Value, AdapterError> {
            self.inner.query(address).await
        }
    }

    /// Never answers
    struct StalledChain;

    #[async_trait]
    impl ChainAdapter for StalledChain {
        async fn submit(&self, _operation: LedgerOperation) -> std::result::Result<Confirmation, AdapterError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(AdapterError::Timeout("unreachable".into()))
        }

        async fn query(&self, address: &Address) -> std::result::Result<serde_json::Value, AdapterError> {
            Err(AdapterError::NotFound(address.to_string()))
        }
    }

    fn local_sim() -> LocalSim {
        let sim = LocalSim::new();
        sim.signer.register("main", "hunter2");
        sim
    }

    #[tokio::test]
    async fn test_submit_confirms() {
        let sim = local_sim();
        let gateway = Gateway::local(&sim, fast_config(3));

        let confirmation = gateway
            .submit("main", "hunter2", "escrow.fund", &json!({ "amount": 1_000_000 }))
            .await
            .unwrap();
        let op = sim.chain.submitted(&confirmation.signature).unwrap();
        assert_eq!(op.kind, "escrow.fund");
        assert_eq!(op.payload["body"]["amount"], 1_000_000);
        assert!(op.payload["signer"].as_str().unwrap().starts_with("key_"));
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_not_submitted() {
        let sim = local_sim();
        let gateway = Gateway::local(&sim, fast_config(3));

        let err = gateway
            .submit("main", "wrong", "escrow.fund", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Capability);
        assert!(!err.is_retriable());
        assert_eq!(sim.chain.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let sim = local_sim();
        sim.chain.reject_kind("staking.stake", "insufficient balance");
        let gateway = Gateway::local(&sim, fast_config(3));

        let err = gateway
            .submit("main", "hunter2", "staking.stake", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GhostSpeakError::Capability { retriable: false, .. }));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let sim = local_sim();
        let chain = Arc::new(FlakyChain {
            failures: 2,
            attempts: AtomicU32::new(0),
            inner: ghostspeak_adapters::LocalSimChain::new(),
        });
        let gateway = Gateway::new(sim.signer.clone(), chain.clone(), sim.blobs.clone(), fast_config(3));

        gateway
            .submit("main", "hunter2", "governance.vote", &json!({ "choice": "for" }))
            .await
            .unwrap();
        assert_eq!(chain.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(chain.inner.submitted_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sim = local_sim();
        let gateway = Gateway::new(sim.signer.clone(), Arc::new(StalledChain), sim.blobs.clone(), fast_config(2));

        let err = gateway
            .submit("main", "hunter2", "escrow.release", &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let sim = local_sim();
        let gateway = Gateway::local(&sim, fast_config(1));
        let profile = json!({ "name": "translator", "languages": ["en", "ja"] });

        let uri = gateway.publish_metadata(&profile).await.unwrap();
        assert_eq!(gateway.fetch_metadata(&uri).await.unwrap(), profile);
        let err = gateway.fetch_metadata("ghost://nothing").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Capability);
    }
}
