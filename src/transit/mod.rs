mod decode;
mod digitransit;
mod error;
mod queries;

use crate::core::models::{EntitySpec, Payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use digitransit::DigitransitClient;
pub use error::{FailureKind, FetchError};

/// One remote call, fully parameterised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    StopTimetable {
        id: String,
        count: u32,
        /// Unix seconds of the earliest departure to list.
        start_time: i64,
        /// Destination stop to look up along each trip.
        eta: Option<String>,
    },
    ClusterTimetable {
        id: String,
        count: u32,
        start_time: i64,
    },
    StopSearch {
        text: String,
    },
    BikeStation {
        id: String,
    },
    CancelledTrips {
        routes: Vec<String>,
    },
}

impl FetchRequest {
    pub fn for_entity(spec: &EntitySpec, now: DateTime<Utc>) -> Self {
        let start_time = |minutes_from: i64| now.timestamp() + minutes_from * 60;
        match spec {
            EntitySpec::Stop {
                id,
                count,
                minutes_from,
                eta,
            } => FetchRequest::StopTimetable {
                id: id.clone(),
                count: *count,
                start_time: start_time(*minutes_from),
                eta: eta.clone(),
            },
            EntitySpec::Cluster {
                id,
                count,
                minutes_from,
            } => FetchRequest::ClusterTimetable {
                id: id.clone(),
                count: *count,
                start_time: start_time(*minutes_from),
            },
            EntitySpec::BikeStation { id } => FetchRequest::BikeStation { id: id.clone() },
            EntitySpec::Search { query, .. } => FetchRequest::StopSearch {
                text: query.clone(),
            },
        }
    }
}

/// Issues a single request and normalises its outcome. Never retries.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError>;
}
