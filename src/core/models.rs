use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Departures closer than this many minutes are shown as a countdown.
pub const COUNTDOWN_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Stop,
    Cluster,
    #[serde(alias = "bikeStation", alias = "bike_station")]
    Station,
    Search,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Stop => "stop",
            EntityKind::Cluster => "cluster",
            EntityKind::Station => "bike station",
            EntityKind::Search => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What to fetch for a tracked entity. Resolved once from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntitySpec {
    Stop {
        id: String,
        count: u32,
        minutes_from: i64,
        /// Destination stop whose arrival time is attached to each departure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
    },
    Cluster {
        id: String,
        count: u32,
        minutes_from: i64,
    },
    BikeStation {
        id: String,
    },
    Search {
        id: String,
        query: String,
    },
}

impl EntitySpec {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySpec::Stop { .. } => EntityKind::Stop,
            EntitySpec::Cluster { .. } => EntityKind::Cluster,
            EntitySpec::BikeStation { .. } => EntityKind::Station,
            EntitySpec::Search { .. } => EntityKind::Search,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            EntitySpec::Stop { id, .. }
            | EntitySpec::Cluster { id, .. }
            | EntitySpec::BikeStation { id }
            | EntitySpec::Search { id, .. } => EntityId::new(id.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub line: Option<String>,
    pub headsign: Option<String>,
    pub departs_at: DateTime<Utc>,
    pub realtime: bool,
    pub cancelled: bool,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub stop_name: Option<String>,
    /// Whole minutes until `departs_at`, kept current by the remaining-time watcher.
    pub remaining_minutes: i64,
    /// Arrival at the configured destination stop, when the trip reaches it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
}

impl Departure {
    pub fn minutes_until(&self, now: DateTime<Utc>) -> i64 {
        let seconds = self.departs_at.signed_duration_since(now).num_seconds();
        // Halves round up, so -30s is still 0 minutes.
        (seconds as f64 / 60.0 + 0.5).floor() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<String>,
    pub hash: Option<i64>,
    pub header: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// One physical stop. A cluster timetable carries one of these per member stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRecord {
    pub gtfs_id: Option<String>,
    pub name: String,
    pub code: Option<String>,
    pub desc: Option<String>,
    pub zone_id: Option<String>,
    pub vehicle_mode: Option<String>,
    pub platform_code: Option<String>,
    pub location_type: Option<String>,
    pub departures: Vec<Departure>,
    pub alerts: Vec<Alert>,
    /// Name of the destination stop used for departure ETAs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    pub name: String,
    pub stops: Vec<StopRecord>,
}

impl Timetable {
    /// Departures of every member stop ordered by departure time.
    pub fn departures(&self) -> Vec<&Departure> {
        let mut departures: Vec<&Departure> =
            self.stops.iter().flat_map(|s| s.departures.iter()).collect();
        departures.sort_by_key(|d| d.departs_at);
        departures
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.stops.iter().flat_map(|s| s.alerts.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSummary {
    pub gtfs_id: String,
    pub name: String,
    pub code: Option<String>,
    pub desc: Option<String>,
    pub zone_id: Option<String>,
    pub vehicle_mode: Option<String>,
    pub platform_code: Option<String>,
    pub cluster_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BikeStation {
    pub station_id: String,
    pub name: String,
    pub bikes_available: u32,
    pub spaces_available: u32,
    pub capacity: Option<u32>,
    pub state: Option<String>,
    pub realtime: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Timetable(Timetable),
    Search(Vec<StopSummary>),
    Station(BikeStation),
    CancelledTrips(Vec<Departure>),
}

impl Payload {
    fn departures_mut(&mut self) -> Box<dyn Iterator<Item = &mut Departure> + '_> {
        match self {
            Payload::Timetable(t) => Box::new(t.stops.iter_mut().flat_map(|s| s.departures.iter_mut())),
            Payload::CancelledTrips(d) => Box::new(d.iter_mut()),
            Payload::Search(_) | Payload::Station(_) => Box::new(std::iter::empty()),
        }
    }

    /// Sets every departure's remaining minutes from `now`.
    pub fn stamp_remaining(&mut self, now: DateTime<Utc>) {
        for departure in self.departures_mut() {
            departure.remaining_minutes = departure.minutes_until(now);
        }
    }

    /// Recomputes remaining minutes of departures that have not left yet.
    pub fn recompute_remaining(&mut self, now: DateTime<Utc>) -> RemainingUpdate {
        let mut update = RemainingUpdate::default();
        for departure in self.departures_mut().filter(|d| d.remaining_minutes >= 0) {
            let previous = departure.remaining_minutes;
            departure.remaining_minutes = departure.minutes_until(now);
            if departure.remaining_minutes >= 0 {
                update.tracked += 1;
            }
            if previous != departure.remaining_minutes
                && departure.remaining_minutes <= COUNTDOWN_WINDOW_MINUTES
            {
                update.changed = true;
            }
        }
        update
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemainingUpdate {
    /// Departures still in the future after the update.
    pub tracked: usize,
    /// Whether any countdown visible on the board moved.
    pub changed: bool,
}

impl RemainingUpdate {
    pub fn merge(self, other: Self) -> Self {
        Self {
            tracked: self.tracked + other.tracked,
            changed: self.changed || other.changed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum EntityData {
    Empty,
    Error(String),
    Ready(Payload),
}

impl EntityData {
    pub fn is_ready(&self) -> bool {
        matches!(self, EntityData::Ready(_))
    }
}

/// Read-only view of one tracked entity, handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub label: Option<String>,
    pub data: EntityData,
    pub last_update: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn departure(departs_at: DateTime<Utc>) -> Departure {
        Departure {
            line: Some("550".to_string()),
            headsign: Some("Itäkeskus".to_string()),
            departs_at,
            realtime: true,
            cancelled: false,
            trip_id: None,
            route_id: None,
            stop_name: None,
            remaining_minutes: 0,
            eta: None,
        }
    }

    fn record(name: &str, departures: Vec<Departure>) -> StopRecord {
        StopRecord {
            gtfs_id: None,
            name: name.to_string(),
            code: None,
            desc: None,
            zone_id: None,
            vehicle_mode: None,
            platform_code: None,
            location_type: None,
            departures,
            alerts: Vec::new(),
            destination: None,
        }
    }

    #[test]
    fn test_minutes_until_rounds() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        assert_eq!(departure(now + Duration::seconds(89)).minutes_until(now), 1);
        assert_eq!(departure(now + Duration::seconds(90)).minutes_until(now), 2);
        assert_eq!(departure(now - Duration::seconds(100)).minutes_until(now), -2);
        assert_eq!(departure(now - Duration::seconds(30)).minutes_until(now), 0);
        assert_eq!(departure(now - Duration::seconds(31)).minutes_until(now), -1);
        assert_eq!(departure(now - Duration::seconds(90)).minutes_until(now), -1);
    }

    #[test]
    fn test_timetable_merges_departures_in_time_order() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let timetable = Timetable {
            name: "Kamppi".to_string(),
            stops: vec![
                record("A", vec![departure(now + Duration::minutes(7))]),
                record(
                    "B",
                    vec![
                        departure(now + Duration::minutes(2)),
                        departure(now + Duration::minutes(9)),
                    ],
                ),
            ],
        };

        let minutes: Vec<i64> = timetable
            .departures()
            .iter()
            .map(|d| d.minutes_until(now))
            .collect();
        assert_eq!(minutes, vec![2, 7, 9]);
    }

    #[test]
    fn test_recompute_only_reports_visible_countdown_changes() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut payload = Payload::Timetable(Timetable {
            name: "Kamppi".to_string(),
            stops: vec![record(
                "A",
                vec![
                    departure(start + Duration::minutes(30)),
                    departure(start + Duration::minutes(5)),
                ],
            )],
        });
        payload.stamp_remaining(start);

        let same_minute = payload.recompute_remaining(start + Duration::seconds(5));
        assert_eq!(same_minute.tracked, 2);
        assert!(!same_minute.changed);

        let next_minute = payload.recompute_remaining(start + Duration::seconds(65));
        assert!(next_minute.changed);

        let gone = payload.recompute_remaining(start + Duration::minutes(40));
        assert_eq!(gone.tracked, 0);
    }
}
