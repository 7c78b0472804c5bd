//! Audience resolution

use async_trait::async_trait;
use sendwell_common::types::EmailAddress;
use sendwell_common::{Error, Result};
use sendwell_storage::models::Campaign;
use std::collections::HashSet;
use tracing::warn;

/// Turns a campaign's audience into the concrete addresses to send to
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// Resolve to a non-empty list of unique, normalized addresses
    async fn resolve(&self, campaign: &Campaign) -> Result<Vec<String>>;
}

/// Resolves the address list stored on the campaign itself
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredAudienceResolver;

#[async_trait]
impl AudienceResolver for StoredAudienceResolver {
    async fn resolve(&self, campaign: &Campaign) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::with_capacity(campaign.audience.len());

        for raw in &campaign.audience {
            match EmailAddress::normalize(raw) {
                Some(address) => {
                    let address = address.to_string();
                    if seen.insert(address.clone()) {
                        addresses.push(address);
                    }
                }
                None => warn!("Skipping invalid address '{}' in campaign {}", raw, campaign.id),
            }
        }

        if addresses.is_empty() {
            return Err(Error::Validation(format!(
                "campaign {} has no deliverable addresses",
                campaign.id
            )));
        }

        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sendwell_storage::models::CreateCampaign;
    use sendwell_storage::repository::CampaignRepository;
    use sendwell_storage::MemoryStore;
    use uuid::Uuid;

    async fn campaign(audience: &[&str]) -> Campaign {
        CampaignRepository::create(
            &MemoryStore::new(),
            CreateCampaign {
                user_id: Uuid::new_v4(),
                name: "Spring".into(),
                audience: audience.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_normalizes_and_dedupes() {
        let c = campaign(&["A@Example.com", "a@example.com ", "b@example.com", "broken"]).await;
        let addresses = StoredAudienceResolver.resolve(&c).await.unwrap();
        assert_eq!(addresses, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn test_empty_audience_fails() {
        let c = campaign(&["nobody"]).await;
        let err = StoredAudienceResolver.resolve(&c).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
