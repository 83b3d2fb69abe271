//! Tagged-union representation of the `payload` extension document.
//!
//! The storage boundary treats `payload` as an arbitrary JSON document; the
//! service keeps it as a closed-but-extensible tagged union keyed by entity
//! `type`, so known source shapes are validated while unrecognised types
//! still round-trip through [`EntityPayload::Opaque`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MusicPayload {
    pub artist: String,
    pub album: Option<String>,
    pub track: String,
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPayload {
    pub camera_model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub album: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SleepPayload {
    pub stage_summary: Option<String>,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub amount_minor_units: i64,
    pub currency: String,
    pub merchant: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPayload {
    pub organizer: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub location_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceMetaPayload {
    pub cluster_k: u32,
    pub member_count: u32,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisitMetaPayload {
    pub place_id: uuid::Uuid,
    pub dwell_minutes: f64,
    pub gap_before_minutes: Option<f64>,
    pub entry_sample_id: uuid::Uuid,
    pub exit_sample_id: uuid::Uuid,
}

/// Per-type extension document.
///
/// Round-trips to JSON without a discriminator field of its own; the
/// variant is selected by the owning entity's `type` at the adapter
/// boundary (see `outbound::persistence::models`), not embedded here, so
/// the document stored in `payload` matches what sources originally sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EntityPayload {
    Music(MusicPayload),
    Photo(PhotoPayload),
    Sleep(SleepPayload),
    Transaction(TransactionPayload),
    Calendar(CalendarPayload),
    PlaceMeta(PlaceMetaPayload),
    VisitMeta(VisitMetaPayload),
    /// Fallback for any `type` without a dedicated shape, or a shape that
    /// fails to parse into one of the known variants.
    Opaque(Value),
}

impl EntityPayload {
    /// Parse a raw JSON document for a given entity `type`, falling back to
    /// [`EntityPayload::Opaque`] for unrecognised types or malformed shapes.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::EntityPayload;
    /// use serde_json::json;
    ///
    /// let payload = EntityPayload::from_type_and_value(
    ///     "music.play",
    ///     json!({"artist": "Test", "track": "Song"}),
    /// );
    /// assert!(matches!(payload, EntityPayload::Music(_)));
    /// ```
    pub fn from_type_and_value(entity_type: &str, value: Value) -> Self {
        let namespace = entity_type.split('.').next().unwrap_or(entity_type);
        let parsed: Option<Self> = match namespace {
            "music" => serde_json::from_value::<MusicPayload>(value.clone())
                .ok()
                .map(Self::Music),
            "photo" => serde_json::from_value::<PhotoPayload>(value.clone())
                .ok()
                .map(Self::Photo),
            "sleep" => serde_json::from_value::<SleepPayload>(value.clone())
                .ok()
                .map(Self::Sleep),
            "transaction" => serde_json::from_value::<TransactionPayload>(value.clone())
                .ok()
                .map(Self::Transaction),
            "calendar" => serde_json::from_value::<CalendarPayload>(value.clone())
                .ok()
                .map(Self::Calendar),
            "place" if entity_type == "place" => {
                serde_json::from_value::<PlaceMetaPayload>(value.clone())
                    .ok()
                    .map(Self::PlaceMeta)
            }
            "place" if entity_type == "place.visit" => {
                serde_json::from_value::<VisitMetaPayload>(value.clone())
                    .ok()
                    .map(Self::VisitMeta)
            }
            _ => None,
        };
        parsed.unwrap_or(Self::Opaque(value))
    }

    /// The JSON document this payload round-trips to at the storage
    /// boundary.
    pub fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn music_type_parses_music_shape() {
        let payload = EntityPayload::from_type_and_value(
            "music.play",
            json!({"artist": "A", "track": "T", "album": null, "durationSeconds": 180}),
        );
        assert!(matches!(payload, EntityPayload::Music(_)));
    }

    #[test]
    fn unknown_type_falls_back_to_opaque() {
        let payload = EntityPayload::from_type_and_value("custom.thing", json!({"foo": "bar"}));
        assert!(matches!(payload, EntityPayload::Opaque(_)));
    }

    #[test]
    fn malformed_known_shape_falls_back_to_opaque() {
        let payload = EntityPayload::from_type_and_value("transaction.debit", json!({"bad": 1}));
        assert!(matches!(payload, EntityPayload::Opaque(_)));
    }

    #[test]
    fn visit_meta_round_trips() {
        let value = json!({
            "placeId": "11111111-1111-1111-1111-111111111111",
            "dwellMinutes": 12.5,
            "gapBeforeMinutes": 3.0,
            "entrySampleId": "22222222-2222-2222-2222-222222222222",
            "exitSampleId": "33333333-3333-3333-3333-333333333333",
        });
        let payload = EntityPayload::from_type_and_value("place.visit", value.clone());
        assert!(matches!(payload, EntityPayload::VisitMeta(_)));
        assert_eq!(payload.into_value(), value);
    }
}
