mod app;
mod dbus;
pub mod scheduler;
pub mod watchers;

use crate::core::settings::Settings;
use anyhow::Result;

pub const DBUS_NAME: &str = "io.github.publika.Publika";
pub const DBUS_PATH: &str = "/io/github/publika/Publika";

pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!(entities = settings.entities.len(), "Starting publika daemon");
    app::run(settings).await
}
