use crate::core::clock::{Clock, SystemClock};
use crate::core::notifications::Notifier;
use crate::core::refresh::RefreshTrigger;
use crate::core::settings::Settings;
use crate::core::store::EntityStore;
use crate::daemon::dbus::{start_dbus_server, DbusCommand};
use crate::daemon::scheduler::PollScheduler;
use crate::daemon::watchers::{WatcherConfig, Watchers};
use crate::transit::{DigitransitClient, FetchAdapter};
use crate::ui::board;
use anyhow::{Context, Result};
use chrono::Local;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const RENDER_THROTTLE: Duration = Duration::from_millis(250);

const MISSING_KEY_MESSAGE: &str = "Digitransit APIs require an API key. \
    Register at the Digitransit API portal and set api.key in config.toml.";
const OFF_SEASON_MESSAGE: &str =
    "City bike season is over. Only the first bike station is kept until April.";
const ETA_NO_STOP_MESSAGE: &str = "Arrival estimates (eta) are only available for stops.";

pub async fn run(settings: Settings) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let trigger = RefreshTrigger::new();
    let notifier = Notifier::new(
        trigger.clone(),
        Arc::clone(&clock),
        Duration::from_secs(settings.notifications.ttl_secs),
        settings.notifications.desktop,
    );

    let resolved = settings.tracked_entities(Local::now().date_naive())?;
    if settings.api.key.is_none() {
        notifier.notify(MISSING_KEY_MESSAGE).await;
    }
    if resolved.off_season {
        notifier.notify(OFF_SEASON_MESSAGE).await;
    }
    if resolved.eta_without_stop {
        notifier.notify(ETA_NO_STOP_MESSAGE).await;
    }
    if resolved.entities.is_empty() {
        tracing::warn!("No entities configured; add [[entities]] to config.toml");
    }

    let store = EntityStore::new(resolved.entities);
    let cancel = CancellationToken::new();
    let adapter: Arc<dyn FetchAdapter> = Arc::new(DigitransitClient::new(&settings.api)?);

    let watchers = Arc::new(Watchers::new(
        store.clone(),
        Arc::clone(&clock),
        trigger.clone(),
        WatcherConfig {
            remaining_tick: Duration::from_millis(settings.polling.remaining_tick_ms),
            status_tick: Duration::from_millis(settings.polling.status_tick_ms),
            age_limit: settings.polling.age_limit(),
        },
        cancel.clone(),
    ));

    let scheduler = Arc::new(
        PollScheduler::new(
            store.clone(),
            adapter,
            Arc::clone(&clock),
            trigger.clone(),
            settings.polling.retry_ms.to_policy(),
        )
        .with_initial_delay(Duration::from_millis(settings.polling.initial_delay_ms))
        .with_watchers(watchers),
    );

    let (dbus_cmd_tx, dbus_cmd_rx) = mpsc::unbounded_channel::<DbusCommand>();
    let _dbus_connection = match start_dbus_server(dbus_cmd_tx).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus unavailable; `publika refresh` will not reach this daemon");
            None
        }
    };
    tokio::spawn(handle_dbus_commands(dbus_cmd_rx, Arc::clone(&scheduler)));

    tokio::spawn(run_render_loop(
        store.clone(),
        notifier.clone(),
        trigger.subscribe(),
        Arc::clone(&clock),
        cancel.clone(),
    ));
    tokio::spawn(run_notification_loop(
        notifier.clone(),
        Duration::from_millis(settings.polling.notification_tick_ms),
        cancel.clone(),
    ));

    let mut tasks = scheduler.spawn_all(cancel.clone()).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down publika daemon");
    cancel.cancel();
    tasks.shutdown().await;

    Ok(())
}

async fn handle_dbus_commands(
    mut cmd_rx: mpsc::UnboundedReceiver<DbusCommand>,
    scheduler: Arc<PollScheduler>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DbusCommand::Refresh => {
                tracing::info!("D-Bus refresh command received");
                scheduler.wake_all();
            }
        }
    }
}

/// Redraws the board whenever the refresh trigger fires, coalescing bursts.
async fn run_render_loop(
    store: EntityStore,
    notifier: Notifier,
    mut refresh_rx: watch::Receiver<u64>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    let interactive = std::io::stdout().is_terminal();

    loop {
        let snapshots = store.snapshot().await;
        let notifications = notifier.list().await;
        let text = board::render(&snapshots, &notifications, clock.now());

        {
            let mut stdout = std::io::stdout().lock();
            if interactive {
                let _ = write!(stdout, "\x1b[2J\x1b[H");
            }
            let _ = writeln!(stdout, "{text}");
            let _ = stdout.flush();
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = refresh_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        tokio::time::sleep(RENDER_THROTTLE).await;
        refresh_rx.borrow_and_update();
    }
}

async fn run_notification_loop(notifier: Notifier, tick: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                notifier.tick().await;
            }
        }
    }
}
