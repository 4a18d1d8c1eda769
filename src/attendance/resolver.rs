use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use tracing::debug;

use super::{
    AttendanceError,
    payload::ScanPayload,
};
use crate::{model::identity::Identity, store::Store};

/// Resolves scanned payloads to identities through a read-through cache.
///
/// Matricules never change, so the cache only risks serving a stale `active`
/// flag; [`IdentityResolver::invalidate`] is called whenever that flag is
/// toggled and the TTL bounds anything else.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
    cache: Cache<String, Identity>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>, capacity: u64, ttl: Duration) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn resolve(&self, raw: &str) -> Result<Identity, AttendanceError> {
        let payload = ScanPayload::parse(raw).map_err(|_| AttendanceError::InvalidPayload)?;
        let identity = self.lookup(&payload.matricule).await?;

        if payload.kind.is_some_and(|kind| kind != identity.kind) {
            debug!(matricule = %payload.matricule, "Payload kind does not match identity");
            return Err(AttendanceError::IdentityNotFound);
        }
        if !identity.active {
            return Err(AttendanceError::InactiveIdentity);
        }

        Ok(identity)
    }

    async fn lookup(&self, matricule: &str) -> Result<Identity, AttendanceError> {
        if let Some(identity) = self.cache.get(matricule).await {
            return Ok(identity);
        }

        let identity = self
            .store
            .find_identity_by_matricule(matricule)
            .await?
            .ok_or(AttendanceError::IdentityNotFound)?;

        self.cache
            .insert(identity.matricule.clone(), identity.clone())
            .await;
        Ok(identity)
    }

    pub async fn invalidate(&self, matricule: &str) {
        self.cache.invalidate(matricule).await;
    }
}
