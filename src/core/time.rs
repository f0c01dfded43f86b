//! Canonical UTC timestamps for lineage events.

use chrono::{DateTime, Utc};

use super::error::LineageError;

/// Output layout: microseconds, always six digits, literal `Z`
const ISO_8601_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format Unix epoch seconds as `YYYY-MM-DDThh:mm:ss.ffffffZ`.
///
/// Fractional seconds are rounded to the nearest microsecond. Non-finite
/// values and instants outside the representable calendar are rejected.
pub fn to_utc_iso_8601(epoch_seconds: f64) -> Result<String, LineageError> {
    if !epoch_seconds.is_finite() {
        return Err(LineageError::InvalidArgument(format!(
            "timestamp must be finite, got {}",
            epoch_seconds
        )));
    }

    let micros = (epoch_seconds * 1_000_000.0).round();
    if micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return Err(out_of_range(epoch_seconds));
    }

    let instant: DateTime<Utc> =
        DateTime::from_timestamp_micros(micros as i64).ok_or_else(|| out_of_range(epoch_seconds))?;

    Ok(instant.format(ISO_8601_MICROS).to_string())
}

fn out_of_range(epoch_seconds: f64) -> LineageError {
    LineageError::InvalidArgument(format!("timestamp {} is out of range", epoch_seconds))
}
