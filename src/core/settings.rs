use crate::core::models::{EntityKind, EntitySpec};
use crate::core::retry::RetryDelays;
use crate::core::rules::VisibilityRule;
use crate::core::store::TrackedEntity;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.digitransit.fi/routing/v1/routers/hsl/index/graphql";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub polling: PollingSettings,
    pub notifications: NotificationSettings,
    pub entities: Vec<EntityConfig>,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: String,
    pub key: Option<String>,
    /// Feed prefix for stop ids, e.g. `HSL` turns `1130113` into `HSL:1130113`.
    pub feed: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            key: None,
            feed: "HSL".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub update_interval_ms: u64,
    pub station_interval_ms: u64,
    pub initial_delay_ms: u64,
    pub retry_ms: RetryDelays,
    pub age_limit_secs: u64,
    pub remaining_tick_ms: u64,
    pub status_tick_ms: u64,
    pub notification_tick_ms: u64,
    pub stop_times_count: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 45_000,
            station_interval_ms: 45_000,
            initial_delay_ms: 0,
            retry_ms: RetryDelays::default(),
            age_limit_secs: 60,
            remaining_tick_ms: 5_000,
            status_tick_ms: 5_000,
            notification_tick_ms: 1_000,
            stop_times_count: 5,
        }
    }
}

impl PollingSettings {
    pub fn interval_for(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::Station => Duration::from_millis(self.station_interval_ms),
            EntityKind::Stop | EntityKind::Cluster | EntityKind::Search => {
                Duration::from_millis(self.update_interval_ms)
            }
        }
    }

    pub fn age_limit(&self) -> Duration {
        Duration::from_secs(self.age_limit_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub desktop: bool,
    pub ttl_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: false,
            ttl_secs: 5,
        }
    }
}

/// Stop ids are numbers in most configs but strings for clusters and stations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigId::Number(n) => write!(f, "{n}"),
            ConfigId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub kind: Option<EntityKind>,
    pub id: Option<ConfigId>,
    pub name: Option<String>,
    pub count: Option<u32>,
    pub minutes_from: Option<i64>,
    pub search: Option<String>,
    pub disabled: bool,
    pub update_interval_ms: Option<u64>,
    pub rules: Vec<VisibilityRule>,
    /// Destination stop id for arrival estimates. Stops only.
    pub eta: Option<ConfigId>,
}

impl EntityConfig {
    /// Resolves the loose config shape into a tagged spec.
    ///
    /// A `search` text makes the entry a search regardless of `kind`.
    pub fn to_spec(&self, default_count: u32) -> Result<EntitySpec> {
        let count = self.count.unwrap_or(default_count);
        let minutes_from = self.minutes_from.unwrap_or(0);

        if let Some(query) = &self.search {
            let id = self
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| query.clone());
            return Ok(EntitySpec::Search {
                id,
                query: query.clone(),
            });
        }

        let id = self
            .id
            .as_ref()
            .map(ToString::to_string)
            .context("entity is missing an id")?;

        Ok(match self.kind.unwrap_or(EntityKind::Stop) {
            EntityKind::Stop => EntitySpec::Stop {
                id,
                count,
                minutes_from,
                eta: self.eta.as_ref().map(ToString::to_string),
            },
            EntityKind::Cluster => EntitySpec::Cluster {
                id,
                count,
                minutes_from,
            },
            EntityKind::Station => EntitySpec::BikeStation { id },
            EntityKind::Search => anyhow::bail!("search entity {id} has no search text"),
        })
    }
}

/// City bikes run from April through October.
pub fn is_bike_season(today: NaiveDate) -> bool {
    (4..=10).contains(&today.month())
}

#[derive(Debug, Default)]
pub struct ResolvedEntities {
    pub entities: Vec<TrackedEntity>,
    /// Set when bike stations were dropped because the season is over.
    pub off_season: bool,
    /// Set when `eta` was configured on something other than a stop.
    pub eta_without_stop: bool,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("publika").join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path().context("Could not determine config directory")?,
        };

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        settings.validate()?;
        tracing::info!(?path, entities = settings.entities.len(), "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.retry_ms.is_empty() {
            anyhow::bail!("polling.retry_ms must contain at least one delay");
        }
        if self.polling.retry_ms.has_zero() {
            anyhow::bail!("polling.retry_ms delays must be greater than zero");
        }
        for (name, value) in [
            ("polling.update_interval_ms", self.polling.update_interval_ms),
            ("polling.station_interval_ms", self.polling.station_interval_ms),
            ("polling.remaining_tick_ms", self.polling.remaining_tick_ms),
            ("polling.status_tick_ms", self.polling.status_tick_ms),
            ("polling.notification_tick_ms", self.polling.notification_tick_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if self.api.url.trim().is_empty() {
            anyhow::bail!("api.url must not be empty");
        }

        let mut seen = HashSet::new();
        for entity in self.entities.iter().filter(|e| !e.disabled) {
            let spec = entity.to_spec(self.polling.stop_times_count)?;
            let id = spec.entity_id();
            if entity.update_interval_ms == Some(0) {
                anyhow::bail!("update_interval_ms of entity {id} must be greater than zero");
            }
            if !seen.insert(id.clone()) {
                anyhow::bail!("entity id {id} is configured more than once");
            }
        }
        Ok(())
    }

    /// Builds the tracked entities for this run, skipping disabled entries.
    ///
    /// Outside bike season only the first bike station is kept.
    pub fn tracked_entities(&self, today: NaiveDate) -> Result<ResolvedEntities> {
        let in_season = is_bike_season(today);
        let mut resolved = ResolvedEntities::default();
        let mut has_station = false;

        for config in self.entities.iter().filter(|e| !e.disabled) {
            let spec = config.to_spec(self.polling.stop_times_count)?;
            if config.eta.is_some() && spec.kind() != EntityKind::Stop {
                tracing::warn!(entity = %spec.entity_id(), "eta is only supported for stops");
                resolved.eta_without_stop = true;
            }

            if spec.kind() == EntityKind::Station && !in_season {
                resolved.off_season = true;
                if has_station {
                    continue;
                }
            }
            has_station |= spec.kind() == EntityKind::Station;

            let interval = config
                .update_interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.polling.interval_for(spec.kind()));

            resolved.entities.push(
                TrackedEntity::new(spec, interval)
                    .with_label(config.name.clone())
                    .with_rules(config.rules.clone()),
            );
        }

        Ok(resolved)
    }
}
