//! Query Planner.
//!
//! Translates the three public query shapes (time-window, bbox, export)
//! into the bounded, index-using [`crate::domain::ports::EntityStore`]
//! calls, and owns the validation/normalization rules the API Surface
//! delegates to before ever reaching the Store.

use chrono::{DateTime, Duration, Utc};

use super::Error;
use super::ports::{BoundingBox, ResampleBin, TimeWindow};

/// Default and maximum `limit` for `/v1/query/time`.
pub const TIME_DEFAULT_LIMIT: u32 = 2000;
/// Default `limit` for `/v1/query/bbox`.
pub const BBOX_DEFAULT_LIMIT: u32 = 5000;
/// Hard cap shared by both query shapes.
pub const MAX_LIMIT: u32 = 10_000;
/// Inclusive bounds on `resample.n`.
pub const MIN_RESAMPLE_N: u32 = 1;
pub const MAX_RESAMPLE_N: u32 = 10_000;

fn validation_error(message: impl Into<String>) -> Error {
    Error::invalid_request(message)
}

/// Validate `start < end`, a requirement shared by time windows across
/// all query shapes.
pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeWindow, Error> {
    if start >= end {
        return Err(validation_error("time window requires start < end"));
    }
    Ok(TimeWindow { start, end })
}

/// Validate a WGS84 envelope: `lonmin < lonmax`, `latmin < latmax`, and
/// all four coordinates within WGS84 bounds.
pub fn validate_bbox(
    lon_min: f64,
    lat_min: f64,
    lon_max: f64,
    lat_max: f64,
) -> Result<BoundingBox, Error> {
    if !(-180.0..=180.0).contains(&lon_min) || !(-180.0..=180.0).contains(&lon_max) {
        return Err(validation_error("longitude must be within [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&lat_min) || !(-90.0..=90.0).contains(&lat_max) {
        return Err(validation_error("latitude must be within [-90, 90]"));
    }
    if lon_min >= lon_max {
        return Err(validation_error("bbox requires lonmin < lonmax"));
    }
    if lat_min >= lat_max {
        return Err(validation_error("bbox requires latmin < latmax"));
    }
    Ok(BoundingBox {
        lon_min,
        lat_min,
        lon_max,
        lat_max,
    })
}

/// Validate and default a `limit`, bounded to `[1, MAX_LIMIT]`.
pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, Error> {
    let limit = limit.unwrap_or(default);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(validation_error(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    Ok(limit)
}

/// Validate `resample.n`.
pub fn validate_resample_n(n: u32) -> Result<u32, Error> {
    if n < MIN_RESAMPLE_N || n > MAX_RESAMPLE_N {
        return Err(validation_error(format!(
            "resample.n must be between {MIN_RESAMPLE_N} and {MAX_RESAMPLE_N}"
        )));
    }
    Ok(n)
}

/// Partition `[window.start, window.end]` into `n` adjacent half-open
/// bins of equal width, with bin `i`'s center at
/// `start + (end - start) * (i + 0.5) / n` (§4.1).
#[must_use]
pub fn resample_bins(types: Vec<String>, window: TimeWindow, n: u32) -> Vec<ResampleBin> {
    let total = window.end - window.start;
    let total_nanos = total.num_nanoseconds().unwrap_or(i64::MAX) as f64;
    let n_f = f64::from(n);

    (0..n)
        .map(|i| {
            let i_f = f64::from(i);
            let bin_start_offset = total_nanos * i_f / n_f;
            let bin_end_offset = total_nanos * (i_f + 1.0) / n_f;
            let center_offset = total_nanos * (i_f + 0.5) / n_f;

            let bin_start = window.start + Duration::nanoseconds(bin_start_offset as i64);
            let bin_end = window.start + Duration::nanoseconds(bin_end_offset as i64);
            let center = window.start + Duration::nanoseconds(center_offset as i64);

            ResampleBin {
                types: types.clone(),
                bin_start,
                bin_end,
                center,
            }
        })
        .collect()
}
