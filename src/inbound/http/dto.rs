//! Wire shapes for the entity surface (§6): request fields accept optional
//! `id` and ignore derived columns if present; responses always carry
//! `id`, project coordinates as scalars, and never expose `geom`/`t_range`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Entity, EntityPayload, Error, LocSource, NewEntity};

use super::validation::{
    missing_field_error, parse_optional_rfc3339_timestamp, parse_rfc3339_timestamp, parse_uuid,
};

/// Caller-supplied entity fields, as accepted by `POST /v1/entity` and
/// `POST /v1/entities/batch`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityRequest {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub t_start: String,
    pub t_end: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub name: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub render_offset: f64,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub loc_source: Option<LocSource>,
    pub payload: Option<Value>,
}

impl EntityRequest {
    /// Parse wire fields into a [`NewEntity`], applying field-level
    /// validation (UUID/timestamp shape) ahead of the domain's own
    /// invariant checks in [`NewEntity::validate`].
    pub fn into_new_entity(self) -> Result<NewEntity, Error> {
        if self.entity_type.trim().is_empty() {
            return Err(missing_field_error("type"));
        }
        let id = self.id.map(|raw| parse_uuid(raw, "id")).transpose()?;
        let t_start = parse_rfc3339_timestamp(self.t_start, "t_start")?;
        let t_end = parse_optional_rfc3339_timestamp(self.t_end, "t_end")?;
        let payload = self
            .payload
            .map(|value| EntityPayload::from_type_and_value(&self.entity_type, value));

        let new_entity = NewEntity {
            id,
            entity_type: self.entity_type,
            t_start,
            t_end,
            lat: self.lat,
            lon: self.lon,
            name: self.name,
            color: self.color,
            render_offset: self.render_offset,
            source: self.source,
            external_id: self.external_id,
            loc_source: self.loc_source,
            payload,
        };
        new_entity
            .validate()
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        Ok(new_entity)
    }
}

/// Entity as returned to clients: always carries `id`, coordinates as
/// scalars, and never `geom`/`t_range` (§6).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
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
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Entity> for EntityResponse {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id,
            entity_type: entity.entity_type,
            t_start: entity.t_start,
            t_end: entity.t_end,
            lat: entity.lat,
            lon: entity.lon,
            name: entity.name,
            color: entity.color,
            render_offset: entity.render_offset,
            source: entity.source,
            external_id: entity.external_id,
            loc_source: entity.loc_source,
            payload: entity.payload.map(EntityPayload::into_value),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
