use crate::core::clock::{Clock, SystemClock};
use crate::core::models::EntitySnapshot;
use crate::core::refresh::RefreshTrigger;
use crate::core::settings::Settings;
use crate::core::store::EntityStore;
use crate::daemon::scheduler::PollScheduler;
use crate::transit::DigitransitClient;
use crate::ui::board;
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Serialize)]
struct StatusOutput {
    entities: Vec<EntitySnapshot>,
    #[serde(with = "chrono::serde::ts_seconds")]
    fetched_at: DateTime<Utc>,
}

/// Fetches every configured entity once and prints the result.
pub async fn run(settings: &Settings, json: bool, entity_filter: Option<String>) -> Result<()> {
    let mut entities = settings.tracked_entities(Local::now().date_naive())?.entities;

    if let Some(filter) = &entity_filter {
        entities.retain(|e| e.id.as_str() == filter);
        if entities.is_empty() {
            anyhow::bail!("Unknown entity: {}. Check the ids in your configuration.", filter);
        }
    } else if entities.is_empty() {
        anyhow::bail!("No entities configured. Add [[entities]] to your configuration.");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = EntityStore::new(entities);
    let scheduler = Arc::new(PollScheduler::new(
        store.clone(),
        Arc::new(DigitransitClient::new(&settings.api)?),
        Arc::clone(&clock),
        RefreshTrigger::new(),
        settings.polling.retry_ms.to_policy(),
    ));

    let mut tasks = JoinSet::new();
    for id in store.ids().await {
        let scheduler = Arc::clone(&scheduler);
        tasks.spawn(async move {
            scheduler.poll_once(&id).await;
        });
    }
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Status fetch task failed");
        }
    }

    let snapshots = store.snapshot().await;
    if json {
        let output = StatusOutput {
            entities: snapshots,
            fetched_at: clock.now(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", board::render(&snapshots, &[], clock.now()));
    }

    Ok(())
}
