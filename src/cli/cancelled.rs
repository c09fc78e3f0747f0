use crate::core::models::{Departure, Payload};
use crate::core::settings::Settings;
use crate::transit::{DigitransitClient, FetchAdapter, FetchRequest};
use crate::ui::board::format_departure_time;
use anyhow::Result;
use chrono::Utc;

/// Lists cancelled trips for the given route ids.
pub async fn run(settings: &Settings, routes: Vec<String>, json: bool) -> Result<()> {
    let client = DigitransitClient::new(&settings.api)?;
    let payload = client.fetch(&FetchRequest::CancelledTrips { routes }).await?;

    let Payload::CancelledTrips(trips) = payload else {
        anyhow::bail!("Unexpected response to cancelled trips query");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&trips)?);
    } else {
        print_text_output(&trips);
    }
    Ok(())
}

fn print_text_output(trips: &[Departure]) {
    if trips.is_empty() {
        println!("No cancelled trips");
        return;
    }

    let now = Utc::now();
    for trip in trips {
        println!(
            "{:<5} {:<28} {:<24} {}",
            trip.line.as_deref().unwrap_or("?"),
            trip.headsign.as_deref().unwrap_or(""),
            trip.stop_name.as_deref().unwrap_or(""),
            format_departure_time(trip, now)
        );
    }
}
