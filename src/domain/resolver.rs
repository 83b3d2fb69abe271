//! Location Enrichment Resolver.
//!
//! Supplies coordinates to timestamped entities that lack native location,
//! by stepping back to the most recent fix from a single configured GPS
//! backbone source. Never extrapolates forward and never interpolates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Error;
use super::entity::{LocSource, NewEntity};

/// Default value for the enrichment backbone source name, used when
/// configuration does not override it (Open Question in SPEC_FULL §9,
/// resolved in DESIGN.md: the backbone is configurable, defaulting here).
pub const DEFAULT_BACKBONE_SOURCE: &str = "arc";

/// Narrow lookup capability the Resolver needs from the Store: the most
/// recent `location.gps` fix from the backbone source at or before a
/// given instant. Implemented by the persistence adapter; kept separate
/// from [`super::ports::EntityStore`] so the Resolver can be tested
/// against a trivial in-memory double.
#[async_trait]
pub trait NativeFixLookup: Send + Sync {
    async fn latest_fix(
        &self,
        source: &str,
        at_or_before: DateTime<Utc>,
    ) -> Result<Option<(f64, f64)>, Error>;
}

/// Resolver parameterized over which source qualifies as the native
/// location backbone.
pub struct LocationResolver<L> {
    lookup: L,
    backbone_source: String,
}

impl<L> LocationResolver<L>
where
    L: NativeFixLookup,
{
    pub fn new(lookup: L, backbone_source: impl Into<String>) -> Self {
        Self {
            lookup,
            backbone_source: backbone_source.into(),
        }
    }

    pub fn with_default_backbone(lookup: L) -> Self {
        Self::new(lookup, DEFAULT_BACKBONE_SOURCE)
    }

    /// `resolve(instant) -> (lat, lon) | None`.
    pub async fn resolve(&self, instant: DateTime<Utc>) -> Result<Option<(f64, f64)>, Error> {
        self.lookup.latest_fix(&self.backbone_source, instant).await
    }

    /// Fill in coordinates on a raw entity lacking them, tagging
    /// provenance per §4.3: entities with native coordinates bypass the
    /// resolver and are tagged `Native`; a resolver hit tags `Inferred`;
    /// a miss leaves coordinates absent and `loc_source` unset.
    pub async fn enrich(
        &self,
        mut entity: NewEntity,
        has_native_location: bool,
    ) -> Result<NewEntity, Error> {
        if entity.lat.is_some() && entity.lon.is_some() {
            entity.loc_source = Some(LocSource::Native);
            return Ok(entity);
        }
        if has_native_location {
            return Ok(entity);
        }
        match self.resolve(entity.t_start).await? {
            Some((lat, lon)) => {
                entity.lat = Some(lat);
                entity.lon = Some(lon);
                entity.loc_source = Some(LocSource::Inferred);
            }
            None => {
                entity.loc_source = None;
            }
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    struct FixedLookup {
        calls: Mutex<Vec<(String, DateTime<Utc>)>>,
        response: Option<(f64, f64)>,
    }

    #[async_trait]
    impl NativeFixLookup for FixedLookup {
        async fn latest_fix(
            &self,
            source: &str,
            at_or_before: DateTime<Utc>,
        ) -> Result<Option<(f64, f64)>, Error> {
            self.calls
                .lock()
                .expect("lock")
                .push((source.to_owned(), at_or_before));
            Ok(self.response)
        }
    }

    fn sample_entity() -> NewEntity {
        NewEntity {
            entity_type: "music.play".to_owned(),
            t_start: Utc::now(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn entities_with_native_coordinates_are_tagged_native_and_bypass_lookup() {
        let lookup = FixedLookup {
            calls: Mutex::new(Vec::new()),
            response: Some((1.0, 2.0)),
        };
        let resolver = LocationResolver::with_default_backbone(lookup);
        let mut entity = sample_entity();
        entity.lat = Some(10.0);
        entity.lon = Some(20.0);

        let enriched = resolver.enrich(entity, false).await.expect("enrich");
        assert_eq!(enriched.loc_source, Some(LocSource::Native));
        assert!(resolver.lookup.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn native_location_sources_bypass_resolver_without_coordinates() {
        let lookup = FixedLookup {
            calls: Mutex::new(Vec::new()),
            response: Some((1.0, 2.0)),
        };
        let resolver = LocationResolver::with_default_backbone(lookup);
        let enriched = resolver
            .enrich(sample_entity(), true)
            .await
            .expect("enrich");
        assert_eq!(enriched.lat, None);
        assert_eq!(enriched.loc_source, None);
    }

    #[tokio::test]
    async fn resolver_hit_assigns_coordinates_and_inferred_tag() {
        let lookup = FixedLookup {
            calls: Mutex::new(Vec::new()),
            response: Some((51.5, -0.1)),
        };
        let resolver = LocationResolver::with_default_backbone(lookup);
        let enriched = resolver
            .enrich(sample_entity(), false)
            .await
            .expect("enrich");
        assert_eq!(enriched.lat, Some(51.5));
        assert_eq!(enriched.lon, Some(-0.1));
        assert_eq!(enriched.loc_source, Some(LocSource::Inferred));
        let calls = resolver.lookup.calls.lock().expect("lock");
        assert_eq!(calls[0].0, DEFAULT_BACKBONE_SOURCE);
    }

    #[tokio::test]
    async fn resolver_miss_leaves_coordinates_absent() {
        let lookup = FixedLookup {
            calls: Mutex::new(Vec::new()),
            response: None,
        };
        let resolver = LocationResolver::with_default_backbone(lookup);
        let enriched = resolver
            .enrich(sample_entity(), false)
            .await
            .expect("enrich");
        assert_eq!(enriched.lat, None);
        assert_eq!(enriched.loc_source, None);
    }

    #[tokio::test]
    async fn resolver_does_not_extrapolate_forward() {
        let lookup = FixedLookup {
            calls: Mutex::new(Vec::new()),
            response: None,
        };
        let resolver = LocationResolver::new(lookup, "custom-backbone");
        let future_instant = Utc::now() + Duration::days(1);
        let result = resolver.resolve(future_instant).await.expect("resolve");
        assert_eq!(result, None);
    }
}
