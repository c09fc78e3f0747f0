use crate::core::clock::Clock;
use crate::core::refresh::RefreshTrigger;
use crate::core::store::EntityStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Changed,
    Unchanged,
    /// Nothing left to watch; the watcher shuts down.
    Idle,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub remaining_tick: Duration,
    pub status_tick: Duration,
    pub age_limit: Duration,
}

/// Background checks tied to wall-clock time rather than fetch cycles.
///
/// Each watcher stops itself once nothing needs watching and is restarted by
/// [`Watchers::ensure_running`] when fresh data arrives.
pub struct Watchers {
    store: EntityStore,
    clock: Arc<dyn Clock>,
    trigger: RefreshTrigger,
    config: WatcherConfig,
    cancel: CancellationToken,
    remaining_running: Arc<Mutex<bool>>,
    status_running: Arc<Mutex<bool>>,
}

impl Watchers {
    pub fn new(
        store: EntityStore,
        clock: Arc<dyn Clock>,
        trigger: RefreshTrigger,
        config: WatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            clock,
            trigger,
            config,
            cancel,
            remaining_running: Arc::new(Mutex::new(false)),
            status_running: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn ensure_running(self: &Arc<Self>) {
        {
            let mut running = self.remaining_running.lock().await;
            if !*running {
                *running = true;
                tracing::info!("Starting remaining time watcher");
                let watchers = Arc::clone(self);
                tokio::spawn(async move { watchers.run_remaining_time().await });
            }
        }

        let mut running = self.status_running.lock().await;
        if !*running {
            *running = true;
            tracing::info!("Starting update status watcher");
            let watchers = Arc::clone(self);
            tokio::spawn(async move { watchers.run_update_status().await });
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> (bool, bool) {
        (
            *self.remaining_running.lock().await,
            *self.status_running.lock().await,
        )
    }

    async fn run_remaining_time(&self) {
        let mut interval = tokio::time::interval(self.config.remaining_tick);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            // Holding the flag across the check keeps a concurrent restart from being lost.
            let mut running = self.remaining_running.lock().await;
            match self.remaining_time_tick().await {
                TickOutcome::Idle => {
                    *running = false;
                    tracing::info!("Shutting down remaining time watcher");
                    return;
                }
                TickOutcome::Changed => self.trigger.trigger(),
                TickOutcome::Unchanged => {}
            }
        }

        *self.remaining_running.lock().await = false;
    }

    async fn run_update_status(&self) {
        let mut interval = tokio::time::interval(self.config.status_tick);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut running = self.status_running.lock().await;
            match self.update_status_tick().await {
                TickOutcome::Idle => {
                    *running = false;
                    tracing::info!("Shutting down update status watcher");
                    return;
                }
                TickOutcome::Changed => self.trigger.trigger(),
                TickOutcome::Unchanged => {}
            }
        }

        *self.status_running.lock().await = false;
    }

    /// Recomputes minutes until departure for every cached row. Never fetches.
    pub async fn remaining_time_tick(&self) -> TickOutcome {
        let update = self.store.recompute_remaining(self.clock.now()).await;
        if update.tracked == 0 {
            TickOutcome::Idle
        } else if update.changed {
            tracing::debug!(tracked = update.tracked, "Remaining times changed");
            TickOutcome::Changed
        } else {
            TickOutcome::Unchanged
        }
    }

    /// Flags entities that have not refreshed within the age limit.
    pub async fn update_status_tick(&self) -> TickOutcome {
        let update = self
            .store
            .flag_stale(self.clock.now(), self.config.age_limit)
            .await;
        for id in &update.flipped {
            tracing::info!(entity = %id, age_limit_secs = self.config.age_limit.as_secs(), "Entity data is stale");
        }

        if !update.flipped.is_empty() {
            TickOutcome::Changed
        } else if update.pending == 0 {
            TickOutcome::Idle
        } else {
            TickOutcome::Unchanged
        }
    }
}
