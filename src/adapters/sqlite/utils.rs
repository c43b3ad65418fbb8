//! Row-mapping helpers shared by the SQLite repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

/// Render a timestamp for storage. Fixed microsecond precision keeps the
/// stored text lexicographically ordered, which the repositories rely on for
/// cutoff comparisons.
pub fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn parse_datetime(s: &str) -> OrchestratorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::StorageIo(format!("bad timestamp '{s}': {e}")))
}

pub fn parse_opt_datetime(s: Option<&str>) -> OrchestratorResult<Option<DateTime<Utc>>> {
    s.map(parse_datetime).transpose()
}

pub fn parse_uuid(s: &str) -> OrchestratorResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| OrchestratorError::StorageIo(format!("bad uuid '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_round_trip() {
        let now = Utc::now();
        let parsed = parse_datetime(&fmt_datetime(now)).unwrap();
        let delta = (now - parsed).num_microseconds().unwrap().abs();
        assert!(delta < 2);
    }

    #[test]
    fn test_fixed_width_ordering() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(5);
        assert!(fmt_datetime(early) < fmt_datetime(late));
    }
}
