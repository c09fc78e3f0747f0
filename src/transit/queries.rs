use crate::transit::FetchRequest;

const ALERTS: &str = "alerts { id alertHash alertSeverityLevel alertHeaderText alertDescriptionText effectiveStartDate effectiveEndDate }";

const TRIP_STOPTIMES: &str =
    "stoptimes { scheduledDeparture realtimeDeparture realtime stop { gtfsId name } }";

fn stop_fields(count: u32, start_time: i64, with_trip_stoptimes: bool) -> String {
    let trip_stoptimes = if with_trip_stoptimes { TRIP_STOPTIMES } else { "" };
    format!(
        "gtfsId name code desc zoneId vehicleMode platformCode locationType \
         routes {{ gtfsId {ALERTS} }} \
         stops {{ routes {{ gtfsId {ALERTS} }} {ALERTS} }} \
         stoptimesWithoutPatterns(numberOfDepartures: {count}, startTime: {start_time}, omitNonPickups: true, omitCanceled: false) {{ \
           realtimeDeparture scheduledDeparture realtime realtimeState serviceDay headsign \
           trip {{ gtfsId routeShortName {trip_stoptimes} route {{ gtfsId {ALERTS} }} {ALERTS} }} \
         }} \
         {ALERTS}"
    )
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Qualifies a bare stop id with the feed prefix.
fn feed_id(feed: &str, id: &str) -> String {
    if id.contains(':') || feed.is_empty() {
        id.to_string()
    } else {
        format!("{feed}:{id}")
    }
}

pub fn build(request: &FetchRequest, feed: &str) -> String {
    match request {
        FetchRequest::StopTimetable {
            id,
            count,
            start_time,
            eta,
        } => format!(
            "{{ stop(id: {}) {{ {} }} }}",
            quoted(&feed_id(feed, id)),
            stop_fields(*count, *start_time, eta.is_some())
        ),
        FetchRequest::ClusterTimetable {
            id,
            count,
            start_time,
        } => format!(
            "{{ cluster(id: {}) {{ name stops {{ {} }} }} }}",
            quoted(id),
            stop_fields(*count, *start_time, false)
        ),
        FetchRequest::StopSearch { text } => format!(
            "{{ stops(name: {}) {{ gtfsId name code desc zoneId vehicleMode platformCode cluster {{ gtfsId }} }} }}",
            quoted(text)
        ),
        FetchRequest::BikeStation { id } => format!(
            "{{ bikeRentalStation(id: {}) {{ stationId name bikesAvailable spacesAvailable capacity state realtime }} }}",
            quoted(id)
        ),
        FetchRequest::CancelledTrips { routes } => {
            let routes: Vec<String> = routes.iter().map(|r| quoted(&feed_id(feed, r))).collect();
            format!(
                "{{ cancelledTripTimes(routes: [{}]) {{ realtimeDeparture scheduledDeparture realtime realtimeState serviceDay headsign stop {{ gtfsId name }} trip {{ gtfsId routeShortName route {{ gtfsId }} }} }} }}",
                routes.join(", ")
            )
        }
    }
}
