use crate::core::models::{Alert, BikeStation, Departure, Payload, StopRecord, StopSummary, Timetable};
use crate::transit::{FetchError, FetchRequest};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default, deserialize_with = "nullable_vec")]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StopData {
    stop: Option<RawStop>,
}

#[derive(Debug, Deserialize)]
struct ClusterData {
    cluster: Option<RawCluster>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default, deserialize_with = "nullable_vec")]
    stops: Vec<RawStopSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationData {
    bike_rental_station: Option<RawBikeStation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelledData {
    #[serde(default, deserialize_with = "nullable_vec")]
    cancelled_trip_times: Vec<RawStoptime>,
}

#[derive(Debug, Deserialize)]
struct RawCluster {
    name: String,
    #[serde(default, deserialize_with = "nullable_vec")]
    stops: Vec<RawStop>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStop {
    gtfs_id: Option<String>,
    name: String,
    code: Option<String>,
    desc: Option<String>,
    zone_id: Option<String>,
    vehicle_mode: Option<String>,
    platform_code: Option<String>,
    location_type: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    alerts: Vec<RawAlert>,
    #[serde(default, deserialize_with = "nullable_vec")]
    routes: Vec<RawRoute>,
    #[serde(default, deserialize_with = "nullable_vec")]
    stops: Vec<RawChildStop>,
    #[serde(default, deserialize_with = "nullable_vec")]
    stoptimes_without_patterns: Vec<RawStoptime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoute {
    gtfs_id: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    alerts: Vec<RawAlert>,
}

#[derive(Debug, Deserialize)]
struct RawChildStop {
    #[serde(default, deserialize_with = "nullable_vec")]
    alerts: Vec<RawAlert>,
    #[serde(default, deserialize_with = "nullable_vec")]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStoptime {
    service_day: i64,
    realtime_departure: Option<i64>,
    scheduled_departure: Option<i64>,
    #[serde(default)]
    realtime: Option<bool>,
    realtime_state: Option<String>,
    headsign: Option<String>,
    trip: Option<RawTrip>,
    stop: Option<RawStopRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrip {
    gtfs_id: Option<String>,
    route_short_name: Option<String>,
    route: Option<RawRoute>,
    #[serde(default, deserialize_with = "nullable_vec")]
    alerts: Vec<RawAlert>,
    #[serde(default, deserialize_with = "nullable_vec")]
    stoptimes: Vec<RawTripStoptime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTripStoptime {
    scheduled_departure: Option<i64>,
    realtime_departure: Option<i64>,
    stop: Option<RawTripStop>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTripStop {
    gtfs_id: Option<String>,
    name: Option<String>,
}

impl RawTripStop {
    fn is(&self, id: &str) -> bool {
        self.gtfs_id.as_deref().is_some_and(|gtfs_id| {
            gtfs_id == id || gtfs_id.rsplit(':').next() == Some(id)
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawStopRef {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlert {
    id: Option<String>,
    alert_hash: Option<i64>,
    alert_severity_level: Option<String>,
    alert_header_text: Option<String>,
    alert_description_text: Option<String>,
    effective_start_date: Option<i64>,
    effective_end_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStopSummary {
    gtfs_id: String,
    name: String,
    code: Option<String>,
    desc: Option<String>,
    zone_id: Option<String>,
    vehicle_mode: Option<String>,
    platform_code: Option<String>,
    cluster: Option<RawClusterRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClusterRef {
    gtfs_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBikeStation {
    station_id: String,
    name: String,
    #[serde(default)]
    bikes_available: Option<u32>,
    #[serde(default)]
    spaces_available: Option<u32>,
    capacity: Option<u32>,
    state: Option<String>,
    #[serde(default)]
    realtime: Option<bool>,
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

impl RawAlert {
    fn into_alert(self) -> Alert {
        Alert {
            id: self.id,
            hash: self.alert_hash,
            header: self.alert_header_text,
            description: self.alert_description_text,
            severity: self.alert_severity_level,
            starts_at: self.effective_start_date.and_then(timestamp),
            ends_at: self.effective_end_date.and_then(timestamp),
        }
    }
}

impl RawStoptime {
    /// Arrival at `target` further along this trip, with that stop's name.
    fn eta_at(&self, target: &str) -> Option<(DateTime<Utc>, Option<String>)> {
        let trip = self.trip.as_ref()?;
        trip.stoptimes.iter().find_map(|stoptime| {
            let stop = stoptime.stop.as_ref().filter(|s| s.is(target))?;
            let offset = stoptime.realtime_departure.or(stoptime.scheduled_departure)?;
            Some((timestamp(self.service_day + offset)?, stop.name.clone()))
        })
    }

    fn into_departure(self) -> Option<Departure> {
        let offset = self.realtime_departure.or(self.scheduled_departure)?;
        let departs_at = timestamp(self.service_day + offset)?;
        let (trip_id, line, route_id) = match self.trip {
            Some(trip) => (
                trip.gtfs_id,
                trip.route_short_name,
                trip.route.and_then(|r| r.gtfs_id),
            ),
            None => (None, None, None),
        };
        Some(Departure {
            line,
            headsign: self.headsign,
            departs_at,
            realtime: self.realtime.unwrap_or(false),
            cancelled: self.realtime_state.as_deref() == Some("CANCELED"),
            trip_id,
            route_id,
            stop_name: self.stop.and_then(|s| s.name),
            remaining_minutes: 0,
            eta: None,
        })
    }
}

impl RawStop {
    /// Alerts of the stop, its routes, child stops and every listed trip.
    fn collect_alerts(&self) -> Vec<Alert> {
        let route_alerts = |routes: &[RawRoute]| {
            routes
                .iter()
                .flat_map(|r| r.alerts.iter().cloned())
                .collect::<Vec<_>>()
        };

        let mut raw: Vec<RawAlert> = self.alerts.clone();
        raw.extend(route_alerts(&self.routes));
        for child in &self.stops {
            raw.extend(child.alerts.iter().cloned());
            raw.extend(route_alerts(&child.routes));
        }
        for stoptime in &self.stoptimes_without_patterns {
            if let Some(trip) = &stoptime.trip {
                raw.extend(trip.alerts.iter().cloned());
                if let Some(route) = &trip.route {
                    raw.extend(route.alerts.iter().cloned());
                }
            }
        }

        let mut alerts: Vec<Alert> = raw.into_iter().map(RawAlert::into_alert).collect();
        alerts.sort_by(|a, b| {
            a.starts_at
                .cmp(&b.starts_at)
                .then_with(|| a.ends_at.cmp(&b.ends_at))
        });
        alerts
    }

    fn into_record(self, eta: Option<&str>) -> StopRecord {
        let alerts = self.collect_alerts();
        let mut destination = None;
        let mut departures: Vec<Departure> = self
            .stoptimes_without_patterns
            .into_iter()
            .filter_map(|stoptime| {
                let arrival = eta.and_then(|target| stoptime.eta_at(target));
                let mut departure = stoptime.into_departure()?;
                if let Some((at, name)) = arrival {
                    departure.eta = Some(at);
                    if destination.is_none() {
                        destination = name;
                    }
                }
                Some(departure)
            })
            .collect();
        departures.sort_by_key(|d| d.departs_at);

        StopRecord {
            gtfs_id: self.gtfs_id,
            name: self.name,
            code: self.code,
            desc: self.desc,
            zone_id: self.zone_id,
            vehicle_mode: self.vehicle_mode,
            platform_code: self.platform_code,
            location_type: self.location_type,
            departures,
            alerts,
            destination,
        }
    }
}

fn unwrap_data<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let response: GraphQlResponse<T> = serde_json::from_str(body)?;
    match response.data {
        Some(data) => Ok(data),
        None if !response.errors.is_empty() => {
            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            Err(FetchError::GraphQl(messages.join("; ")))
        }
        None => Err(FetchError::DataAbsent("No data".to_string())),
    }
}

/// Turns a response body into the payload `request` asked for.
pub fn decode(request: &FetchRequest, body: &str) -> Result<Payload, FetchError> {
    match request {
        FetchRequest::StopTimetable { id, eta, .. } => {
            let stop = unwrap_data::<StopData>(body)?
                .stop
                .ok_or_else(|| FetchError::DataAbsent(format!("No stop data for {id}")))?;
            let record = stop.into_record(eta.as_deref());
            Ok(Payload::Timetable(Timetable {
                name: record.name.clone(),
                stops: vec![record],
            }))
        }
        FetchRequest::ClusterTimetable { id, .. } => {
            let cluster = unwrap_data::<ClusterData>(body)?
                .cluster
                .ok_or_else(|| FetchError::DataAbsent(format!("No cluster data for {id}")))?;
            if cluster.stops.is_empty() {
                return Err(FetchError::DataAbsent(format!("Cluster {id} has no stop data")));
            }
            Ok(Payload::Timetable(Timetable {
                name: cluster.name,
                stops: cluster
                    .stops
                    .into_iter()
                    .map(|stop| stop.into_record(None))
                    .collect(),
            }))
        }
        FetchRequest::StopSearch { .. } => {
            let stops = unwrap_data::<SearchData>(body)?
                .stops
                .into_iter()
                .map(|s| StopSummary {
                    gtfs_id: s.gtfs_id,
                    name: s.name,
                    code: s.code,
                    desc: s.desc,
                    zone_id: s.zone_id,
                    vehicle_mode: s.vehicle_mode,
                    platform_code: s.platform_code,
                    cluster_id: s.cluster.and_then(|c| c.gtfs_id),
                })
                .collect();
            Ok(Payload::Search(stops))
        }
        FetchRequest::BikeStation { id } => {
            let station = unwrap_data::<StationData>(body)?
                .bike_rental_station
                .ok_or_else(|| FetchError::DataAbsent(format!("No bike station data for {id}")))?;
            Ok(Payload::Station(BikeStation {
                station_id: station.station_id,
                name: station.name,
                bikes_available: station.bikes_available.unwrap_or(0),
                spaces_available: station.spaces_available.unwrap_or(0),
                capacity: station.capacity,
                state: station.state,
                realtime: station.realtime.unwrap_or(false),
            }))
        }
        FetchRequest::CancelledTrips { .. } => {
            let mut departures: Vec<Departure> = unwrap_data::<CancelledData>(body)?
                .cancelled_trip_times
                .into_iter()
                .filter_map(RawStoptime::into_departure)
                .collect();
            departures.sort_by_key(|d| d.departs_at);
            Ok(Payload::CancelledTrips(departures))
        }
    }
}
