use crate::core::models::{
    BikeStation, Departure, EntityData, EntitySnapshot, Payload, StopSummary, Timetable,
    COUNTDOWN_WINDOW_MINUTES,
};
use crate::core::notifications::Notification;
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

const MAX_HEADSIGN: usize = 28;

/// Plain-text board of every tracked entity, redrawn on each refresh.
pub fn render(
    snapshots: &[EntitySnapshot],
    notifications: &[Notification],
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    for notification in notifications {
        let _ = writeln!(out, "! {}", notification.message);
    }
    if !notifications.is_empty() {
        out.push('\n');
    }

    for (i, snapshot) in snapshots.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_entity(&mut out, snapshot, now);
    }

    out
}

fn render_entity(out: &mut String, snapshot: &EntitySnapshot, now: DateTime<Utc>) {
    let title = snapshot.label.clone().unwrap_or_else(|| match &snapshot.data {
        EntityData::Ready(Payload::Timetable(t)) => t.name.clone(),
        EntityData::Ready(Payload::Station(s)) => s.name.clone(),
        _ => snapshot.id.to_string(),
    });
    let stale = if snapshot.stale { " (not updated)" } else { "" };
    let _ = writeln!(out, "{} [{}]{}", title, snapshot.kind.name(), stale);

    match &snapshot.data {
        EntityData::Empty => {
            let _ = writeln!(out, "  Loading...");
        }
        EntityData::Error(reason) => {
            let _ = writeln!(out, "  Error: {}", reason);
        }
        EntityData::Ready(Payload::Timetable(timetable)) => render_timetable(out, timetable, now),
        EntityData::Ready(Payload::Search(stops)) => render_search(out, stops),
        EntityData::Ready(Payload::Station(station)) => render_station(out, station),
        EntityData::Ready(Payload::CancelledTrips(trips)) => {
            for departure in trips {
                render_departure(out, departure, now);
            }
        }
    }
}

fn render_timetable(out: &mut String, timetable: &Timetable, now: DateTime<Utc>) {
    for alert in timetable.alerts() {
        if let Some(header) = alert.header.as_deref().or(alert.description.as_deref()) {
            let _ = writeln!(out, "  ! {}", header);
        }
    }

    if let Some(destination) = timetable.stops.iter().find_map(|s| s.destination.as_deref()) {
        let _ = writeln!(out, "  Arrival at {}", destination);
    }

    let departures = timetable.departures();
    if departures.is_empty() {
        let _ = writeln!(out, "  No departures");
    }
    for departure in departures {
        render_departure(out, departure, now);
    }
}

fn render_departure(out: &mut String, departure: &Departure, now: DateTime<Utc>) {
    let line = departure.line.as_deref().unwrap_or("?");
    let headsign = truncate(departure.headsign.as_deref().unwrap_or(""), MAX_HEADSIGN);
    let when = if departure.cancelled {
        "cancelled".to_string()
    } else {
        format_departure_time(departure, now)
    };
    let realtime = if departure.realtime { "*" } else { " " };

    let _ = write!(out, "  {:<5} {:<28} {:>9}{}", line, headsign, when, realtime);
    if let Some(eta) = departure.eta {
        let _ = write!(out, " -> {}", eta.with_timezone(&Local).format("%H:%M"));
    }
    out.push('\n');
}

/// Countdown inside the window, local clock time outside it.
pub fn format_departure_time(departure: &Departure, now: DateTime<Utc>) -> String {
    let minutes = departure.minutes_until(now);
    if minutes <= 0 {
        "now".to_string()
    } else if minutes <= COUNTDOWN_WINDOW_MINUTES {
        format!("{} min", minutes)
    } else {
        departure
            .departs_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string()
    }
}

fn render_search(out: &mut String, stops: &[StopSummary]) {
    if stops.is_empty() {
        let _ = writeln!(out, "  No stops found");
    }
    for stop in stops {
        let code = stop.code.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  {:<8} {:<24} {}", code, stop.name, stop.gtfs_id);
    }
}

fn render_station(out: &mut String, station: &BikeStation) {
    let _ = writeln!(
        out,
        "  {} bikes, {} free spaces",
        station.bikes_available, station.spaces_available
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{EntityId, EntityKind, StopRecord};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap()
    }

    fn departure(line: &str, minutes: i64, cancelled: bool) -> Departure {
        Departure {
            line: Some(line.to_string()),
            headsign: Some("Rautatientori".to_string()),
            departs_at: now() + Duration::minutes(minutes),
            realtime: true,
            cancelled,
            trip_id: None,
            route_id: None,
            stop_name: None,
            remaining_minutes: minutes,
            eta: None,
        }
    }

    fn snapshot(data: EntityData) -> EntitySnapshot {
        EntitySnapshot {
            id: EntityId::from("1130113"),
            kind: EntityKind::Stop,
            label: None,
            data,
            last_update: None,
            stale: false,
        }
    }

    #[test]
    fn test_countdown_inside_window() {
        assert_eq!(format_departure_time(&departure("55", 0, false), now()), "now");
        assert_eq!(format_departure_time(&departure("55", 4, false), now()), "4 min");
        assert_eq!(format_departure_time(&departure("55", 10, false), now()), "10 min");
        assert!(format_departure_time(&departure("55", 11, false), now()).contains(':'));
    }

    #[test]
    fn test_renders_timetable_rows() {
        let data = EntityData::Ready(Payload::Timetable(Timetable {
            name: "Kamppi".to_string(),
            stops: vec![StopRecord {
                gtfs_id: Some("HSL:1130113".to_string()),
                name: "Kamppi".to_string(),
                code: None,
                desc: None,
                zone_id: None,
                vehicle_mode: None,
                platform_code: None,
                location_type: None,
                departures: vec![departure("55", 3, false), departure("18", 6, true)],
                alerts: Vec::new(),
                destination: None,
            }],
        }));

        let board = render(&[snapshot(data)], &[], now());
        assert!(board.starts_with("Kamppi [stop]"));
        assert!(board.contains("3 min"));
        assert!(board.contains("cancelled"));
    }

    #[test]
    fn test_renders_arrival_estimate() {
        let mut with_eta = departure("55", 3, false);
        with_eta.eta = Some(now() + Duration::minutes(15));
        let expected = with_eta
            .eta
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string();
        let data = EntityData::Ready(Payload::Timetable(Timetable {
            name: "Kamppi".to_string(),
            stops: vec![StopRecord {
                gtfs_id: Some("HSL:1130113".to_string()),
                name: "Kamppi".to_string(),
                code: None,
                desc: None,
                zone_id: None,
                vehicle_mode: None,
                platform_code: None,
                location_type: None,
                departures: vec![with_eta, departure("18", 6, false)],
                alerts: Vec::new(),
                destination: Some("Rautatientori".to_string()),
            }],
        }));

        let board = render(&[snapshot(data)], &[], now());
        assert!(board.contains("Arrival at Rautatientori"));
        assert!(board.contains(&format!("-> {expected}")));
        assert_eq!(board.matches("->").count(), 1);
    }

    #[test]
    fn test_renders_error_and_stale() {
        let mut snap = snapshot(EntityData::Error("API returned status 503".to_string()));
        snap.stale = true;
        let board = render(&[snap], &[], now());
        assert!(board.contains("1130113 [stop] (not updated)"));
        assert!(board.contains("Error: API returned status 503"));
    }

    #[test]
    fn test_truncate_long_headsign() {
        assert_eq!(truncate("Espoon keskus", 20), "Espoon keskus");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
