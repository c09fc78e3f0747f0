use crate::core::models::{Payload, StopSummary};
use crate::core::settings::Settings;
use crate::transit::{DigitransitClient, FetchAdapter, FetchRequest};
use anyhow::Result;

pub async fn run(settings: &Settings, text: String, json: bool) -> Result<()> {
    let client = DigitransitClient::new(&settings.api)?;
    let payload = client.fetch(&FetchRequest::StopSearch { text }).await?;

    let Payload::Search(stops) = payload else {
        anyhow::bail!("Unexpected response to stop search");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stops)?);
    } else {
        print_text_output(&stops);
    }
    Ok(())
}

fn print_text_output(stops: &[StopSummary]) {
    if stops.is_empty() {
        println!("No stops found");
        return;
    }

    for stop in stops {
        let code = stop.code.as_deref().unwrap_or("-");
        let mode = stop.vehicle_mode.as_deref().unwrap_or("");
        println!("{:<16} {:<8} {:<28} {}", stop.gtfs_id, code, stop.name, mode);
        if let Some(cluster) = &stop.cluster_id {
            println!("  cluster: {}", cluster);
        }
    }
}
