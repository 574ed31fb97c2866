//! Defensive decoding for status documents written by older installers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::record::{StepResult, StepStatus};

/// Optional timestamp that accepts RFC 3339, naive ISO 8601 and
/// `YYYY-MM-DD HH:MM:SS`. Unparseable values decode as `None`.
pub mod lenient_datetime {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_timestamp))
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    tracing::debug!(value = raw, "Ignoring unparseable timestamp");
    None
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepEntry {
    Full(StepResult),
    Legacy(u32),
}

/// Step history that also accepts the legacy list of completed step numbers.
pub fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<StepEntry>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .map(|entry| match entry {
            StepEntry::Full(result) => result,
            StepEntry::Legacy(number) => StepResult {
                step_id: legacy_step_id(number as usize),
                status: StepStatus::Succeeded,
                ..StepResult::pending("")
            },
        })
        .collect())
}

/// Id under which a numbered step from an old record is stored.
pub fn legacy_step_id(position: usize) -> String {
    format!("step-{}", position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_timestamp_shapes() {
        assert!(parse_timestamp("2025-03-01T10:20:30+00:00").is_some());
        assert!(parse_timestamp("2025-03-01T10:20:30.123456").is_some());
        assert!(parse_timestamp("2025-03-01 10:20:30").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
