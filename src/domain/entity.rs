//! Entity aggregate and its derived spatial/temporal columns.
//!
//! Purpose: a single uniformly shaped record type capable of hosting
//! unrelated source schemas (GPS fixes, music history, calendar events,
//! ...), with the invariants that keep `geom`/`t_range` consistent with
//! their scalar sources enforced here rather than trusted to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::payload::EntityPayload;

/// Provenance of an entity's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocSource {
    /// Coordinates supplied directly by the originating source.
    Native,
    /// Coordinates filled in by the Location Enrichment Resolver.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    EmptyType,
    TEndBeforeTStart,
    CoordinatesPartiallySpecified,
    InvalidColor(String),
}

impl std::fmt::Display for EntityValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyType => write!(f, "entity type must not be empty"),
            Self::TEndBeforeTStart => write!(f, "t_end must be at or after t_start"),
            Self::CoordinatesPartiallySpecified => {
                write!(f, "lat and lon must both be present or both be absent")
            }
            Self::InvalidColor(value) => write!(f, "color must be #RRGGBB, got {value:?}"),
        }
    }
}

impl std::error::Error for EntityValidationError {}

/// A closed UTC interval, derived from `t_start`/`t_end` (invariant I3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Two closed intervals `[a,b]`, `[c,d]` overlap iff `a <= d && c <= b`.
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start <= other_end && other_start <= self.end
    }
}

/// A 2-D point in SRID 4326 (WGS84), derived from `(lat, lon)` (invariant I2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

/// The unified spatiotemporal record.
///
/// ## Invariants
/// - I1: `t_end` is `None` or `t_end >= t_start`.
/// - I2: `geom` is `None` iff either `lat`/`lon` is `None`.
/// - I3: `t_range` equals `[t_start, t_end.unwrap_or(t_start)]`.
/// - I4: when `source` and `external_id` are both set, the pair is unique
///   across the store (enforced by the persistence layer, not this type).
/// - I5: `loc_source = Native` implies native coordinates; `Inferred`
///   implies the Resolver supplied them.
/// - I6: `updated_at >= created_at`.
///
/// `geom`, `t_range`, and `updated_at` are never settable directly by
/// callers; they are recomputed by the [`super::maintainer`] on every
/// write that changes their sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: Uuid,
    pub entity_type: String,
    pub t_start: DateTime<Utc>,
    pub t_end: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geom: Option<GeoPoint>,
    pub t_range: TimeRange,
    pub name: Option<String>,
    pub color: Option<String>,
    pub render_offset: f64,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub loc_source: Option<LocSource>,
    pub payload: Option<EntityPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new or upserted entity.
///
/// Unlike [`Entity`], this carries no derived columns: the Maintainer
/// computes `geom`/`t_range`/`updated_at` from these fields in the write
/// path, and `id`/`created_at` are assigned by the Store when absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewEntity {
    pub id: Option<Uuid>,
    pub entity_type: String,
    pub t_start: DateTime<Utc>,
    pub t_end: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub render_offset: f64,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub loc_source: Option<LocSource>,
    pub payload: Option<EntityPayload>,
}

const HEX_COLOR_LEN: usize = 7;

fn validate_color(color: &str) -> Result<(), EntityValidationError> {
    let bytes = color.as_bytes();
    let is_valid = bytes.len() == HEX_COLOR_LEN
        && bytes[0] == b'#'
        && bytes[1..].iter().all(u8::is_ascii_hexdigit);
    if is_valid {
        Ok(())
    } else {
        Err(EntityValidationError::InvalidColor(color.to_owned()))
    }
}

impl NewEntity {
    /// Validate the caller-supplied invariants that do not depend on
    /// derived columns (I1, coordinate pairing, color shape).
    ///
    /// # Examples
    /// ```
    /// use backend::domain::NewEntity;
    /// use chrono::Utc;
    ///
    /// let mut entity = NewEntity::default();
    /// entity.entity_type = "location.gps".to_owned();
    /// entity.t_start = Utc::now();
    /// assert!(entity.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.entity_type.trim().is_empty() {
            return Err(EntityValidationError::EmptyType);
        }
        if let Some(t_end) = self.t_end
            && t_end < self.t_start
        {
            return Err(EntityValidationError::TEndBeforeTStart);
        }
        if self.lat.is_some() != self.lon.is_some() {
            return Err(EntityValidationError::CoordinatesPartiallySpecified);
        }
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        Ok(())
    }
}

/// Untyped document form of [`EntityPayload`], used at the HTTP/storage
/// boundary before the tagged union is resolved for a given `type`.
pub type RawPayload = Value;
