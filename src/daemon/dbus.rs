use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use zbus::interface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbusCommand {
    Refresh,
}

pub struct PublikaService {
    cmd_tx: mpsc::UnboundedSender<DbusCommand>,
}

impl PublikaService {
    pub fn new(cmd_tx: mpsc::UnboundedSender<DbusCommand>) -> Self {
        Self { cmd_tx }
    }
}

#[interface(name = "io.github.publika.Publika")]
impl PublikaService {
    async fn refresh(&self) -> zbus::fdo::Result<()> {
        tracing::info!("D-Bus Refresh called");
        self.cmd_tx
            .send(DbusCommand::Refresh)
            .map_err(|_| zbus::fdo::Error::Failed("daemon is shutting down".to_string()))
    }
}

pub async fn start_dbus_server(
    cmd_tx: mpsc::UnboundedSender<DbusCommand>,
) -> Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()
        .context("Failed to connect to session D-Bus")?
        .name(DBUS_NAME)
        .context("Invalid D-Bus name")?
        .serve_at(DBUS_PATH, PublikaService::new(cmd_tx))
        .context("Failed to register D-Bus object")?
        .build()
        .await
        .context("Failed to claim D-Bus name - is another daemon running?")?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service started");
    Ok(connection)
}
