use crate::core::clock::Clock;
use crate::core::models::{EntityId, EntityKind};
use crate::core::refresh::RefreshTrigger;
use crate::core::retry::RetryPolicy;
use crate::core::rules;
use crate::core::settings::is_bike_season;
use crate::core::store::EntityStore;
use crate::daemon::watchers::Watchers;
use crate::transit::{FetchAdapter, FetchRequest};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What an entity loop does after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPoll {
    After(Duration),
    Done,
}

pub struct PollScheduler {
    store: EntityStore,
    adapter: Arc<dyn FetchAdapter>,
    clock: Arc<dyn Clock>,
    trigger: RefreshTrigger,
    retry_policy: RetryPolicy,
    initial_delay: Duration,
    watchers: Option<Arc<Watchers>>,
    wake: Arc<Notify>,
}

impl PollScheduler {
    pub fn new(
        store: EntityStore,
        adapter: Arc<dyn FetchAdapter>,
        clock: Arc<dyn Clock>,
        trigger: RefreshTrigger,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            adapter,
            clock,
            trigger,
            retry_policy,
            initial_delay: Duration::ZERO,
            watchers: None,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_watchers(mut self, watchers: Arc<Watchers>) -> Self {
        self.watchers = Some(watchers);
        self
    }

    /// Cuts every sleeping entity's wait short. Fetches already in flight are left alone.
    pub fn wake_all(&self) {
        self.wake.notify_waiters();
    }

    /// Starts one sequential loop per entity.
    pub async fn spawn_all(self: &Arc<Self>, cancel: CancellationToken) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for id in self.store.ids().await {
            let scheduler = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move { scheduler.run_entity(id, cancel).await });
        }
        tracing::info!(entities = tasks.len(), "Poll scheduler started");
        tasks
    }

    async fn run_entity(&self, id: EntityId, cancel: CancellationToken) {
        let mut delay = self.initial_delay;

        loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.wake.notified() => {
                        tracing::debug!(entity = %id, "Woken for immediate refresh");
                    }
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once(&id).await {
                NextPoll::After(next) => delay = next,
                NextPoll::Done => {
                    tracing::debug!(entity = %id, "Entity needs no further polling");
                    break;
                }
            }
        }
    }

    /// Runs a single `Fetching` transition for `id` and reports when to run the next one.
    pub async fn poll_once(&self, id: &EntityId) -> NextPoll {
        let Some(entity) = self.store.get(id).await else {
            tracing::warn!(entity = %id, "Unknown entity, stopping its loop");
            return NextPoll::Done;
        };

        let now = self.clock.now();
        let local_now = now.with_timezone(&Local).naive_local();

        if !rules::is_visible(&entity.rules, local_now) {
            tracing::debug!(entity = %id, "Outside visibility rules, skipping fetch");
            return NextPoll::After(entity.update_interval);
        }
        if entity.kind() == EntityKind::Station && !is_bike_season(local_now.date()) {
            tracing::debug!(entity = %id, "Bike season is over, skipping fetch");
            return NextPoll::After(entity.update_interval);
        }

        let request = FetchRequest::for_entity(&entity.spec, now);
        let result = self.adapter.fetch(&request).await;

        match result {
            Ok(payload) => {
                let previous_failures = self
                    .store
                    .record_success(id, payload, self.clock.now())
                    .await
                    .unwrap_or_default();
                if previous_failures > 0 {
                    tracing::info!(
                        entity = %id,
                        failures = previous_failures,
                        "Entity recovered from error state"
                    );
                } else {
                    tracing::debug!(entity = %id, kind = entity.kind().name(), "Fetched entity");
                }

                self.trigger.trigger();
                if let Some(watchers) = &self.watchers {
                    watchers.ensure_running().await;
                }

                match entity.kind() {
                    EntityKind::Search => NextPoll::Done,
                    EntityKind::Stop | EntityKind::Cluster | EntityKind::Station => {
                        NextPoll::After(entity.update_interval)
                    }
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let outcome = self
                    .store
                    .record_failure(id, error_msg.clone(), &self.retry_policy)
                    .await;
                self.trigger.trigger();

                let Some(outcome) = outcome else {
                    return NextPoll::Done;
                };
                tracing::warn!(
                    entity = %id,
                    error = %error_msg,
                    failure = ?e.kind(),
                    consecutive_failures = outcome.consecutive_failures,
                    next_retry_ms = outcome.delay.as_millis() as u64,
                    "Failed to fetch entity, backing off"
                );
                NextPoll::After(outcome.delay)
            }
        }
    }
}
