//! Derived-Column Maintainer.
//!
//! Upholds invariants I2 and I3 (`geom`, `t_range`) on every write, so
//! callers never populate those columns themselves. Lives on the write
//! path of the Store; the persistence adapter calls [`derive_columns`]
//! (or performs the equivalent derivation in SQL) immediately before
//! each upsert.

use chrono::Utc;

use super::entity::{Entity, GeoPoint, NewEntity, TimeRange};

/// Recompute `geom`/`t_range`/timestamps from a caller-supplied entity.
///
/// `existing_created_at` carries the original `created_at` forward on
/// updates (the Store passes `None` for fresh inserts).
///
/// # Examples
/// ```
/// use backend::domain::{maintainer::derive_columns, NewEntity};
/// use chrono::Utc;
///
/// let mut input = NewEntity::default();
/// input.entity_type = "location.gps".to_owned();
/// input.t_start = Utc::now();
/// input.lat = Some(1.0);
/// input.lon = Some(2.0);
///
/// let entity = derive_columns(uuid::Uuid::new_v4(), input, None);
/// assert!(entity.geom.is_some());
/// ```
pub fn derive_columns(
    id: uuid::Uuid,
    input: NewEntity,
    existing_created_at: Option<chrono::DateTime<Utc>>,
) -> Entity {
    let now = Utc::now();
    let geom = match (input.lat, input.lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lon, lat }),
        _ => None,
    };
    let t_range = TimeRange {
        start: input.t_start,
        end: input.t_end.unwrap_or(input.t_start),
    };

    Entity {
        id,
        entity_type: input.entity_type,
        t_start: input.t_start,
        t_end: input.t_end,
        lat: input.lat,
        lon: input.lon,
        geom,
        t_range,
        name: input.name,
        color: input.color,
        render_offset: input.render_offset,
        source: input.source,
        external_id: input.external_id,
        loc_source: input.loc_source,
        payload: input.payload,
        created_at: existing_created_at.unwrap_or(now),
        updated_at: now,
    }
}
