//! The discovery catalog: the registry backing `GET /discovery/resources`.
//!
//! Sellers register a resource's payment requirements once (typically at service
//! startup or on first successful settlement); the catalog makes the set of known
//! paid resources enumerable without requiring a caller to already know a URL.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use stellar_x402_types::proto::DiscoveryEntry;

/// Default and maximum page sizes for [`DiscoveryCatalog::list`].
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery store transport error: {0}")]
    Transport(String),
}

/// A page of [`DiscoveryCatalog::list`] results, filtered, sorted, and paginated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListQuery<'a> {
    pub entry_type: Option<&'a str>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl<'a> ListQuery<'a> {
    /// Clamps `limit` into `[1, MAX_LIST_LIMIT]`, defaulting to `DEFAULT_LIST_LIMIT`.
    fn clamped_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

pub trait DiscoveryCatalog: Send + Sync {
    fn register(
        &self,
        entry: DiscoveryEntry,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send;

    fn unregister(
        &self,
        resource: &str,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send;

    fn get(
        &self,
        resource: &str,
    ) -> impl Future<Output = Result<Option<DiscoveryEntry>, DiscoveryError>> + Send;

    /// Lists entries matching `query.entry_type`, sorted by `lastUpdated` descending,
    /// and paginated by `query.offset`/`query.limit` (clamped to `[1, MAX_LIST_LIMIT]`,
    /// defaulting to `DEFAULT_LIST_LIMIT`).
    fn list(
        &self,
        query: ListQuery<'_>,
    ) -> impl Future<Output = Result<Vec<DiscoveryEntry>, DiscoveryError>> + Send;
}

/// In-memory discovery catalog. Like [`crate::replay_store::InMemoryReplayStore`],
/// this is a development/testing fallback only: it does not survive a restart and is
/// not shared across facilitator replicas.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDiscoveryCatalog {
    entries: Arc<DashMap<String, DiscoveryEntry>>,
}

impl InMemoryDiscoveryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiscoveryCatalog for InMemoryDiscoveryCatalog {
    async fn register(&self, entry: DiscoveryEntry) -> Result<(), DiscoveryError> {
        self.entries.insert(entry.resource.clone(), entry);
        Ok(())
    }

    async fn unregister(&self, resource: &str) -> Result<(), DiscoveryError> {
        self.entries.remove(resource);
        Ok(())
    }

    async fn get(&self, resource: &str) -> Result<Option<DiscoveryEntry>, DiscoveryError> {
        Ok(self.entries.get(resource).map(|entry| entry.clone()))
    }

    async fn list(&self, query: ListQuery<'_>) -> Result<Vec<DiscoveryEntry>, DiscoveryError> {
        let mut entries: Vec<DiscoveryEntry> = self
            .entries
            .iter()
            .map(|entry| entry.clone())
            .filter(|entry| {
                query
                    .entry_type
                    .is_none_or(|entry_type| entry.entry_type == entry_type)
            })
            .collect();
        entries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

        let limit = query.clamped_limit();
        Ok(entries.into_iter().skip(query.offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::{Asset, PaymentRequirements, Scheme};
    use stellar_x402_types::timestamp::UnixTimestamp;

    fn sample_entry(resource: &str) -> DiscoveryEntry {
        sample_entry_with(resource, "http", 0)
    }

    fn sample_entry_with(resource: &str, entry_type: &str, last_updated: u64) -> DiscoveryEntry {
        DiscoveryEntry {
            resource: resource.to_string(),
            entry_type: entry_type.to_string(),
            accepts: vec![PaymentRequirements {
                scheme: Scheme::Exact,
                network: Network::StellarTestnet,
                max_amount_required: "1000".to_string(),
                resource: resource.to_string(),
                description: "".to_string(),
                mime_type: "application/json".to_string(),
                pay_to: "GABC".to_string(),
                max_timeout_seconds: 60,
                asset: Asset::Native,
                extra: None,
            }],
            last_updated: UnixTimestamp::from_secs(last_updated),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn registered_entry_is_listed_and_gettable() {
        let catalog = InMemoryDiscoveryCatalog::new();
        catalog
            .register(sample_entry("https://example.com/a"))
            .await
            .unwrap();
        assert_eq!(catalog.list(ListQuery::default()).await.unwrap().len(), 1);
        assert!(catalog.get("https://example.com/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unregistered_entry_disappears() {
        let catalog = InMemoryDiscoveryCatalog::new();
        catalog
            .register(sample_entry("https://example.com/a"))
            .await
            .unwrap();
        catalog.unregister("https://example.com/a").await.unwrap();
        assert!(catalog.get("https://example.com/a").await.unwrap().is_none());
        assert!(catalog.list(ListQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_entry_type() {
        let catalog = InMemoryDiscoveryCatalog::new();
        catalog
            .register(sample_entry_with("https://example.com/a", "http", 1))
            .await
            .unwrap();
        catalog
            .register(sample_entry_with("https://example.com/b", "api", 2))
            .await
            .unwrap();

        let query = ListQuery {
            entry_type: Some("api"),
            ..Default::default()
        };
        let results = catalog.list(query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resource, "https://example.com/b");
    }

    #[tokio::test]
    async fn list_sorts_by_last_updated_descending() {
        let catalog = InMemoryDiscoveryCatalog::new();
        catalog
            .register(sample_entry_with("https://example.com/older", "http", 1))
            .await
            .unwrap();
        catalog
            .register(sample_entry_with("https://example.com/newer", "http", 2))
            .await
            .unwrap();

        let results = catalog.list(ListQuery::default()).await.unwrap();
        assert_eq!(results[0].resource, "https://example.com/newer");
        assert_eq!(results[1].resource, "https://example.com/older");
    }

    #[tokio::test]
    async fn list_paginates_with_offset_and_limit() {
        let catalog = InMemoryDiscoveryCatalog::new();
        for i in 0..5u64 {
            catalog
                .register(sample_entry_with(
                    &format!("https://example.com/{i}"),
                    "http",
                    i,
                ))
                .await
                .unwrap();
        }

        let query = ListQuery {
            limit: Some(2),
            offset: 1,
            ..Default::default()
        };
        let results = catalog.list(query).await.unwrap();
        assert_eq!(results.len(), 2);
        // Newest (4) is offset 0; offset 1 starts at 3.
        assert_eq!(results[0].resource, "https://example.com/3");
        assert_eq!(results[1].resource, "https://example.com/2");
    }

    #[tokio::test]
    async fn list_limit_is_clamped_to_max() {
        let catalog = InMemoryDiscoveryCatalog::new();
        for i in 0..3u64 {
            catalog
                .register(sample_entry_with(&format!("https://example.com/{i}"), "http", i))
                .await
                .unwrap();
        }
        let query = ListQuery {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(catalog.list(query).await.unwrap().len(), 3);
    }
}
