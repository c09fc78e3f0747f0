use crate::core::models::{
    EntityData, EntityId, EntityKind, EntitySnapshot, EntitySpec, Payload, RemainingUpdate,
};
use crate::core::retry::{RetryPolicy, RetryState};
use crate::core::rules::VisibilityRule;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub id: EntityId,
    pub spec: EntitySpec,
    pub label: Option<String>,
    pub update_interval: Duration,
    pub rules: Vec<VisibilityRule>,
    pub data: EntityData,
    pub last_update: Option<DateTime<Utc>>,
    pub stale: bool,
    pub retry: RetryState,
}

impl TrackedEntity {
    pub fn new(spec: EntitySpec, update_interval: Duration) -> Self {
        Self {
            id: spec.entity_id(),
            spec,
            label: None,
            update_interval,
            rules: Vec::new(),
            data: EntityData::Empty,
            last_update: None,
            stale: false,
            retry: RetryState::new(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn with_rules(mut self, rules: Vec<VisibilityRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.spec.kind()
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id.clone(),
            kind: self.kind(),
            label: self.label.clone(),
            data: self.data.clone(),
            last_update: self.last_update,
            stale: self.stale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub delay: Duration,
    pub consecutive_failures: u32,
}

#[derive(Default)]
struct StoreInner {
    order: Vec<EntityId>,
    entities: HashMap<EntityId, TrackedEntity>,
}

/// Tracked entities in configuration order with keyed access.
///
/// Every write targets a single entity slot.
#[derive(Clone, Default)]
pub struct EntityStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl EntityStore {
    pub fn new(entities: Vec<TrackedEntity>) -> Self {
        let mut inner = StoreInner::default();
        for entity in entities {
            if inner.entities.contains_key(&entity.id) {
                tracing::warn!(entity = %entity.id, "Duplicate entity id, keeping the first");
                continue;
            }
            inner.order.push(entity.id.clone());
            inner.entities.insert(entity.id.clone(), entity);
        }
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn ids(&self) -> Vec<EntityId> {
        self.inner.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn get(&self, id: &EntityId) -> Option<TrackedEntity> {
        self.inner.read().await.entities.get(id).cloned()
    }

    /// Writes `Ready`, stamps the update time, clears staleness and resets the retry cursor.
    ///
    /// Returns the number of failures that preceded this success.
    pub async fn record_success(
        &self,
        id: &EntityId,
        mut payload: Payload,
        now: DateTime<Utc>,
    ) -> Option<u32> {
        payload.stamp_remaining(now);

        let mut inner = self.inner.write().await;
        let entity = inner.entities.get_mut(id)?;
        let previous_failures = entity.retry.consecutive_failures();
        entity.data = EntityData::Ready(payload);
        entity.last_update = Some(now);
        entity.stale = false;
        entity.retry.record_success();
        Some(previous_failures)
    }

    /// Replaces the entity data with `Error` and consumes the next retry delay.
    pub async fn record_failure(
        &self,
        id: &EntityId,
        reason: String,
        policy: &RetryPolicy,
    ) -> Option<FailureOutcome> {
        let mut inner = self.inner.write().await;
        let entity = inner.entities.get_mut(id)?;
        entity.data = EntityData::Error(reason);
        let delay = entity.retry.record_failure(policy);
        Some(FailureOutcome {
            delay,
            consecutive_failures: entity.retry.consecutive_failures(),
        })
    }

    pub async fn recompute_remaining(&self, now: DateTime<Utc>) -> RemainingUpdate {
        let mut inner = self.inner.write().await;
        inner
            .entities
            .values_mut()
            .filter_map(|entity| match &mut entity.data {
                EntityData::Ready(payload) => Some(payload.recompute_remaining(now)),
                EntityData::Empty | EntityData::Error(_) => None,
            })
            .fold(RemainingUpdate::default(), RemainingUpdate::merge)
    }

    /// Flags entities whose last success is older than `age_limit`.
    ///
    /// Each entity flips at most once per aging period; only a later success clears it.
    pub async fn flag_stale(&self, now: DateTime<Utc>, age_limit: Duration) -> StaleUpdate {
        let mut inner = self.inner.write().await;
        let StoreInner { order, entities } = &mut *inner;
        let mut update = StaleUpdate::default();

        for id in order.iter() {
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            let Some(last_update) = entity.last_update else {
                continue;
            };
            if entity.stale {
                continue;
            }

            let age = now.signed_duration_since(last_update).to_std().unwrap_or_default();
            if age > age_limit {
                entity.stale = true;
                update.flipped.push(id.clone());
            } else {
                update.pending += 1;
            }
        }

        update
    }

    pub async fn snapshot(&self) -> Vec<EntitySnapshot> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.entities.get(id))
            .map(TrackedEntity::snapshot)
            .collect()
    }

    pub async fn snapshot_of(&self, id: &EntityId) -> Option<EntitySnapshot> {
        self.inner.read().await.entities.get(id).map(TrackedEntity::snapshot)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleUpdate {
    /// Entities that became stale on this check.
    pub flipped: Vec<EntityId>,
    /// Entities with data that may still age out.
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::BikeStation;
    use crate::core::retry::RetryDelays;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn stop(id: &str) -> TrackedEntity {
        TrackedEntity::new(
            EntitySpec::Stop {
                id: id.to_string(),
                count: 5,
                minutes_from: 0,
                eta: None,
            },
            Duration::from_secs(45),
        )
    }

    fn station_payload() -> Payload {
        Payload::Station(BikeStation {
            station_id: "070".to_string(),
            name: "Kamppi".to_string(),
            bikes_available: 4,
            spaces_available: 12,
            capacity: Some(16),
            state: None,
            realtime: true,
        })
    }

    #[tokio::test]
    async fn test_preserves_configuration_order() {
        let store = EntityStore::new(vec![stop("3"), stop("1"), stop("2")]);
        let ids: Vec<String> = store
            .ids()
            .await
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_kept_once() {
        let store = EntityStore::new(vec![stop("1"), stop("1")]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_replaces_ready_data() {
        let store = EntityStore::new(vec![stop("1234")]);
        let id = EntityId::from("1234");
        let policy = RetryDelays::Sequence(vec![1_000, 5_000]).to_policy();

        store.record_success(&id, station_payload(), start()).await;
        assert!(store.get(&id).await.unwrap().data.is_ready());

        let outcome = store
            .record_failure(&id, "No data".to_string(), &policy)
            .await
            .unwrap();
        assert_eq!(outcome.delay, Duration::from_secs(1));
        assert_eq!(outcome.consecutive_failures, 1);

        let entity = store.get(&id).await.unwrap();
        assert_eq!(entity.data, EntityData::Error("No data".to_string()));
        assert_eq!(entity.last_update, Some(start()));
    }

    #[tokio::test]
    async fn test_success_resets_retry_and_staleness() {
        let store = EntityStore::new(vec![stop("1234")]);
        let id = EntityId::from("1234");
        let policy = RetryPolicy::default();

        store.record_success(&id, station_payload(), start()).await;
        store
            .flag_stale(start() + chrono::Duration::seconds(61), Duration::from_secs(60))
            .await;
        store.record_failure(&id, "timeout".to_string(), &policy).await;
        store.record_failure(&id, "timeout".to_string(), &policy).await;

        let later = start() + chrono::Duration::seconds(90);
        let previous = store.record_success(&id, station_payload(), later).await;
        assert_eq!(previous, Some(2));

        let entity = store.get(&id).await.unwrap();
        assert_eq!(entity.retry.cursor(), 0);
        assert!(!entity.stale);
        assert_eq!(entity.last_update, Some(later));
    }

    #[tokio::test]
    async fn test_stale_flips_once() {
        let store = EntityStore::new(vec![stop("1234"), stop("never")]);
        let id = EntityId::from("1234");
        let limit = Duration::from_secs(60);
        store.record_success(&id, station_payload(), start()).await;

        let young = store.flag_stale(start() + chrono::Duration::seconds(60), limit).await;
        assert!(young.flipped.is_empty());
        assert_eq!(young.pending, 1);

        let old = store.flag_stale(start() + chrono::Duration::seconds(61), limit).await;
        assert_eq!(old.flipped, vec![id.clone()]);
        assert_eq!(old.pending, 0);

        let again = store.flag_stale(start() + chrono::Duration::seconds(120), limit).await;
        assert!(again.flipped.is_empty());
        assert!(store.get(&id).await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_unknown_entity_writes_are_ignored() {
        let store = EntityStore::new(vec![stop("1")]);
        let missing = EntityId::from("2");
        assert!(store
            .record_success(&missing, station_payload(), start())
            .await
            .is_none());
        assert!(store
            .record_failure(&missing, "x".to_string(), &RetryPolicy::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let store = EntityStore::new(vec![stop("1").with_label(Some("Home".to_string()))]);
        let snapshot = store.snapshot_of(&EntityId::from("1")).await.unwrap();
        assert_eq!(snapshot.kind, EntityKind::Stop);
        assert_eq!(snapshot.label.as_deref(), Some("Home"));
        assert_eq!(snapshot.data, EntityData::Empty);
        assert!(snapshot.last_update.is_none());
        assert!(!snapshot.stale);
    }
}
