use chrono::{Datelike, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

const TIME_FORMAT: &str = "%H:%M";

/// Time window during which an entity is shown and polled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityRule {
    /// Weekdays counted from Sunday = 0.
    pub days: Option<Vec<u32>>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl VisibilityRule {
    fn passes(&self, now: NaiveDateTime) -> bool {
        if let Some(days) = &self.days {
            if !days.contains(&now.weekday().num_days_from_sunday()) {
                return false;
            }
        }

        if let Some(start) = &self.start_time {
            match NaiveTime::parse_from_str(start, TIME_FORMAT) {
                Ok(start) if start > now.time() => return false,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(start_time = %start, error = %e, "Invalid rule definition");
                    return true;
                }
            }
        }

        if let Some(end) = &self.end_time {
            match NaiveTime::parse_from_str(end, TIME_FORMAT) {
                Ok(end) if end < now.time() => return false,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(end_time = %end, error = %e, "Invalid rule definition");
                    return true;
                }
            }
        }

        true
    }
}

/// An entity without rules is always visible; otherwise any passing rule suffices.
pub fn is_visible(rules: &[VisibilityRule], now: NaiveDateTime) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.passes(now))
}
