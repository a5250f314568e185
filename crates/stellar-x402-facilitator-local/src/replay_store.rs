//! Replay protection: the "has this transaction hash already been settled" store.
//!
//! Settlement must be at-most-once per transaction hash even under concurrent
//! requests for the same payload. [`ReplayStore`] exposes exactly the operations
//! that invariant needs: a linearizable claim-or-fail write (`mark_pending`), a
//! terminal write (`mark_settled`), a release on failure (`release_pending`), and a
//! read (`get`). [`InMemoryReplayStore`] is a `dashmap`-backed fallback suitable only
//! for local development and tests; it loses all state across process restarts and
//! does not coordinate across facilitator replicas.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;

/// The terminal outcome recorded for a transaction hash once settlement has been
/// attempted.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub success: bool,
    pub payer: String,
    pub network: stellar_x402_types::network::Network,
}

/// Per-key state tracked by the in-memory store between `mark_pending` and a
/// terminal write.
#[derive(Debug, Clone)]
enum Entry {
    Pending,
    Settled(SettlementRecord),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayStoreError {
    #[error("replay store transport error: {0}")]
    Transport(String),
}

/// Keyed persistence for settlement outcomes, keyed by ledger transaction hash.
///
/// Implementations must make `mark_pending` linearizable per key: concurrent callers
/// racing on the same hash must see exactly one `Ok(true)` (the claim winner) and the
/// rest `Ok(false)`.
pub trait ReplayStore: Send + Sync {
    /// Atomically claims `tx_hash` for settlement. Returns `true` if this call won the
    /// claim, `false` if another call already holds it (pending or settled).
    fn mark_pending(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<bool, ReplayStoreError>> + Send;

    /// Records the terminal outcome for a hash previously claimed via `mark_pending`.
    fn mark_settled(
        &self,
        tx_hash: &str,
        record: SettlementRecord,
    ) -> impl Future<Output = Result<(), ReplayStoreError>> + Send;

    /// Releases a claim taken by `mark_pending` without recording a terminal outcome,
    /// used when settlement itself fails before reaching the ledger (so a later retry
    /// of the same transaction hash is not permanently blocked).
    fn release_pending(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<(), ReplayStoreError>> + Send;

    /// Looks up a previously recorded terminal outcome, if any.
    fn get(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Option<SettlementRecord>, ReplayStoreError>> + Send;
}

/// In-memory replay store backed by a sharded concurrent map. Not suitable for
/// production use: state does not survive a restart and is not shared across
/// facilitator replicas.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReplayStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayStore for InMemoryReplayStore {
    async fn mark_pending(&self, tx_hash: &str) -> Result<bool, ReplayStoreError> {
        use dashmap::mapref::entry::Entry as MapEntry;
        match self.entries.entry(tx_hash.to_string()) {
            MapEntry::Occupied(_) => Ok(false),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::Pending);
                Ok(true)
            }
        }
    }

    async fn mark_settled(
        &self,
        tx_hash: &str,
        record: SettlementRecord,
    ) -> Result<(), ReplayStoreError> {
        self.entries
            .insert(tx_hash.to_string(), Entry::Settled(record));
        Ok(())
    }

    async fn release_pending(&self, tx_hash: &str) -> Result<(), ReplayStoreError> {
        self.entries.remove_if(tx_hash, |_, entry| matches!(entry, Entry::Pending));
        Ok(())
    }

    async fn get(&self, tx_hash: &str) -> Result<Option<SettlementRecord>, ReplayStoreError> {
        Ok(self.entries.get(tx_hash).and_then(|entry| match &*entry {
            Entry::Settled(record) => Some(record.clone()),
            Entry::Pending => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_x402_types::network::Network;

    #[tokio::test]
    async fn second_claim_on_same_hash_loses() {
        let store = InMemoryReplayStore::new();
        assert!(store.mark_pending("deadbeef").await.unwrap());
        assert!(!store.mark_pending("deadbeef").await.unwrap());
    }

    #[tokio::test]
    async fn released_claim_can_be_retaken() {
        let store = InMemoryReplayStore::new();
        assert!(store.mark_pending("deadbeef").await.unwrap());
        store.release_pending("deadbeef").await.unwrap();
        assert!(store.mark_pending("deadbeef").await.unwrap());
    }

    #[tokio::test]
    async fn settled_record_is_retrievable_and_not_reclaimable() {
        let store = InMemoryReplayStore::new();
        store.mark_pending("deadbeef").await.unwrap();
        store
            .mark_settled(
                "deadbeef",
                SettlementRecord {
                    success: true,
                    payer: "GSOURCE".to_string(),
                    network: Network::StellarTestnet,
                },
            )
            .await
            .unwrap();
        let record = store.get("deadbeef").await.unwrap().expect("recorded");
        assert!(record.success);
        assert!(!store.mark_pending("deadbeef").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_hash_has_no_record() {
        let store = InMemoryReplayStore::new();
        assert!(store.get("never-seen").await.unwrap().is_none());
    }
}
