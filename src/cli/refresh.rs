use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};

/// Asks a running daemon to refetch every entity now.
pub async fn run() -> Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    connection
        .call_method(Some(DBUS_NAME), DBUS_PATH, Some(DBUS_NAME), "Refresh", &())
        .await
        .context("Failed to call Refresh - is `publika daemon` running?")?;

    println!("Refresh requested");
    Ok(())
}
