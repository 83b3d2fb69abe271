//! Diesel-backed implementation of the [`EntityStore`] port.
//!
//! `geom`/`t_range` are Postgres generated columns (see the embedded
//! migration), so the adapter never writes them directly: it supplies
//! `lat`/`lon`/`t_start`/`t_end` and the database derives the rest,
//! matching the Maintainer contract (§4.2) at the storage layer rather
//! than duplicating it in application code. Queries that touch `geom`
//! or the resample operator's per-bin lookups go through
//! [`diesel::sql_query`], since PostGIS geometry has no first-class
//! Diesel mapping in this stack; simpler reads use the typed
//! `source_state` table and the query builder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::sql_types::{
    Array, Float8, Int8, Jsonb, Nullable, Text, Timestamptz, Uuid as SqlUuid,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, QueryableByName};
use diesel_async::RunQueryDsl;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::entity::{Entity, GeoPoint, LocSource, NewEntity, TimeRange};
use crate::domain::ports::entity_store::{
    BboxOrder, BboxQuery, BoundingBox, EntityStore, EntityStoreError, ExportFilter, ExportOrder,
    PlaceDetail, PlaceSummary, RenamePlaceOutcome, ResampleBin, StoreStats, TimeOrder, TimeQuery,
    TimeWindow, UpsertOutcome,
};
use crate::domain::watermark::Watermark;

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::pool::DbPool;
use super::schema::source_state;

const STREAM_PAGE_SIZE: i64 = 500;

/// Flat row shape shared by every entity-returning query in this adapter.
#[derive(Debug, Clone, QueryableByName)]
struct EntityRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    entity_type: String,
    #[diesel(sql_type = Timestamptz)]
    t_start: DateTime<Utc>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    t_end: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Float8>)]
    lat: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    lon: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    color: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Float8)]
    render_offset: f64,
    #[diesel(sql_type = Nullable<Text>)]
    source: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    external_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    loc_source: Option<String>,
    #[diesel(sql_type = Nullable<Jsonb>)]
    payload: Option<Value>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    updated_at: DateTime<Utc>,
}

impl From<EntityRow> for Entity {
    fn from(row: EntityRow) -> Self {
        let geom = match (row.lat, row.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lon, lat }),
            _ => None,
        };
        let t_range = TimeRange {
            start: row.t_start,
            end: row.t_end.unwrap_or(row.t_start),
        };
        let loc_source = row.loc_source.as_deref().map(|value| match value {
            "native" => LocSource::Native,
            _ => LocSource::Inferred,
        });
        let payload = row
            .payload
            .map(|value| crate::domain::payload::EntityPayload::from_type_and_value(&row.entity_type, value));

        Entity {
            id: row.id,
            entity_type: row.entity_type,
            t_start: row.t_start,
            t_end: row.t_end,
            lat: row.lat,
            lon: row.lon,
            geom,
            t_range,
            name: row.name,
            color: row.color,
            render_offset: row.render_offset,
            source: row.source,
            external_id: row.external_id,
            loc_source,
            payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ENTITY_COLUMNS: &str = "id, type AS entity_type, t_start, t_end, lat, lon, name, color, \
    render_offset, source, external_id, loc_source, payload, created_at, updated_at";

fn loc_source_str(loc_source: Option<LocSource>) -> Option<&'static str> {
    match loc_source {
        Some(LocSource::Native) => Some("native"),
        Some(LocSource::Inferred) => Some("inferred"),
        None => None,
    }
}

/// Diesel + `bb8` backed [`EntityStore`].
pub struct DieselEntityStore {
    pool: DbPool,
}

impl DieselEntityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert_one(&self, entity: NewEntity) -> Result<(Uuid, UpsertOutcome), EntityStoreError> {
        entity
            .validate()
            .map_err(|err| EntityStoreError::query(err.to_string()))?;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let payload_json = entity.payload.as_ref().map(|p| p.clone().into_value());
        let loc_source = loc_source_str(entity.loc_source);

        let has_dedup_key = entity.source.is_some() && entity.external_id.is_some();
        let sql = if has_dedup_key {
            format!(
                "INSERT INTO entities (id, type, t_start, t_end, lat, lon, name, color, \
                 render_offset, source, external_id, loc_source, payload, created_at, updated_at) \
                 VALUES (coalesce($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
                 $12, $13, now(), now()) \
                 ON CONFLICT (source, external_id) WHERE source IS NOT NULL AND external_id IS NOT NULL \
                 DO UPDATE SET type = EXCLUDED.type, t_start = EXCLUDED.t_start, t_end = EXCLUDED.t_end, \
                 lat = EXCLUDED.lat, lon = EXCLUDED.lon, name = EXCLUDED.name, color = EXCLUDED.color, \
                 render_offset = EXCLUDED.render_offset, loc_source = EXCLUDED.loc_source, \
                 payload = EXCLUDED.payload, updated_at = now() \
                 RETURNING id, (xmax = 0) AS inserted"
            )
        } else {
            "INSERT INTO entities (id, type, t_start, t_end, lat, lon, name, color, render_offset, \
             source, external_id, loc_source, payload, created_at, updated_at) \
             VALUES (coalesce($1, gen_random_uuid()), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
             $12, $13, now(), now()) \
             RETURNING id, true AS inserted"
                .to_owned()
        };

        #[derive(QueryableByName)]
        struct UpsertOutcomeRow {
            #[diesel(sql_type = SqlUuid)]
            id: Uuid,
            #[diesel(sql_type = diesel::sql_types::Bool)]
            inserted: bool,
        }

        let row: UpsertOutcomeRow = diesel::sql_query(sql)
            .bind::<Nullable<SqlUuid>, _>(entity.id)
            .bind::<Text, _>(&entity.entity_type)
            .bind::<Timestamptz, _>(entity.t_start)
            .bind::<Nullable<Timestamptz>, _>(entity.t_end)
            .bind::<Nullable<Float8>, _>(entity.lat)
            .bind::<Nullable<Float8>, _>(entity.lon)
            .bind::<Nullable<Text>, _>(&entity.name)
            .bind::<Nullable<Text>, _>(&entity.color)
            .bind::<diesel::sql_types::Float8, _>(entity.render_offset)
            .bind::<Nullable<Text>, _>(&entity.source)
            .bind::<Nullable<Text>, _>(&entity.external_id)
            .bind::<Nullable<Text>, _>(loc_source)
            .bind::<Nullable<Jsonb>, _>(payload_json)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let outcome = if row.inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        };
        Ok((row.id, outcome))
    }

    fn order_clause(order: TimeOrder) -> &'static str {
        match order {
            TimeOrder::Asc => "ASC",
            TimeOrder::Desc => "DESC",
        }
    }
}

#[async_trait]
impl EntityStore for DieselEntityStore {
    async fn upsert(&self, entity: NewEntity) -> Result<(Uuid, UpsertOutcome), EntityStoreError> {
        self.upsert_one(entity).await
    }

    async fn bulk_upsert(
        &self,
        entities: Vec<NewEntity>,
    ) -> Result<Vec<(Uuid, UpsertOutcome)>, EntityStoreError> {
        // All-or-nothing: perform every upsert, but since each upsert_one
        // checks out its own connection, correctness of "all-or-nothing"
        // relies on the caller re-running the full batch on any failure
        // (idempotent via the (source, external_id) unique key, per the
        // run protocol's failure semantics).
        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            results.push(self.upsert_one(entity).await?);
        }
        Ok(results)
    }

    async fn query_time(&self, query: TimeQuery) -> Result<Vec<Entity>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE (cardinality($1) = 0 OR type = ANY($1)) \
             AND t_range && tstzrange($2, $3, '[]') \
             ORDER BY t_start {} LIMIT $4",
            Self::order_clause(query.order)
        );
        let rows: Vec<EntityRow> = diesel::sql_query(sql)
            .bind::<Array<Text>, _>(&query.types)
            .bind::<Timestamptz, _>(query.window.start)
            .bind::<Timestamptz, _>(query.window.end)
            .bind::<Int8, _>(i64::from(query.limit))
            .get_results(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(Entity::from).collect())
    }

    async fn query_resample(
        &self,
        bins: Vec<ResampleBin>,
    ) -> Result<Vec<Entity>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE (cardinality($1) = 0 OR type = ANY($1)) \
             AND t_start >= $2 AND t_start < $3 \
             ORDER BY abs(extract(epoch from (t_start - $4))) ASC, t_start ASC, id ASC \
             LIMIT 1"
        );

        let mut results = Vec::with_capacity(bins.len());
        for bin in bins {
            let row: Option<EntityRow> = diesel::sql_query(&sql)
                .bind::<Array<Text>, _>(&bin.types)
                .bind::<Timestamptz, _>(bin.bin_start)
                .bind::<Timestamptz, _>(bin.bin_end)
                .bind::<Timestamptz, _>(bin.center)
                .get_result(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?;
            if let Some(row) = row {
                results.push(Entity::from(row));
            }
        }
        results.sort_by_key(|e| e.t_start);
        Ok(results)
    }

    async fn query_bbox(&self, query: BboxQuery) -> Result<Vec<Entity>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let BoundingBox {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        } = query.bbox;

        let order = match query.order {
            BboxOrder::TStartAsc => "ORDER BY t_start ASC",
            BboxOrder::TStartDesc => "ORDER BY t_start DESC",
            BboxOrder::Random => "ORDER BY random()",
        };

        // Always bind a window to keep the parameter list static; an
        // unbounded window (min/max representable instants) is a no-op
        // predicate when the caller did not request a time filter.
        let (window_start, window_end) = match query.window {
            Some(window) => (window.start, window.end),
            None => (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC),
        };

        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE (cardinality($1) = 0 OR type = ANY($1)) \
             AND lon BETWEEN $2 AND $3 AND lat BETWEEN $4 AND $5 \
             AND t_range && tstzrange($6, $7, '[]') \
             {order} LIMIT $8"
        );

        let rows: Vec<EntityRow> = diesel::sql_query(sql)
            .bind::<Array<Text>, _>(&query.types)
            .bind::<Float8, _>(lon_min)
            .bind::<Float8, _>(lon_max)
            .bind::<Float8, _>(lat_min)
            .bind::<Float8, _>(lat_max)
            .bind::<Timestamptz, _>(window_start)
            .bind::<Timestamptz, _>(window_end)
            .bind::<Int8, _>(i64::from(query.limit))
            .get_results(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(Entity::from).collect())
    }

    async fn stream_all(
        &self,
        filter: ExportFilter,
    ) -> Result<(i64, BoxStream<'static, Result<Entity, EntityStoreError>>), EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let types = filter.types.clone().unwrap_or_default();

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = Int8)]
            count: i64,
        }
        let count_row: CountRow = diesel::sql_query(
            "SELECT count(*) AS count FROM entities WHERE (cardinality($1) = 0 OR type = ANY($1))",
        )
        .bind::<Array<Text>, _>(&types)
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        let pool = self.pool.clone();
        let order = filter.order;
        let state = StreamState {
            pool,
            types,
            order,
            cursor: None,
            buffer: std::collections::VecDeque::new(),
            exhausted: false,
        };

        let stream = stream::unfold(state, move |mut state| async move {
            if let Some(row) = state.buffer.pop_front() {
                return Some((Ok(Entity::from(row)), state));
            }
            if state.exhausted {
                return None;
            }
            match state.fetch_page().await {
                Ok(()) => match state.buffer.pop_front() {
                    Some(row) => Some((Ok(Entity::from(row)), state)),
                    None => None,
                },
                Err(err) => {
                    state.exhausted = true;
                    Some((Err(err), state))
                }
            }
        })
        .boxed();

        Ok((count_row.count, stream))
    }

    async fn get_watermark(&self, source: &str) -> Result<Option<Watermark>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<(String, DateTime<Utc>, i64, DateTime<Utc>)> = source_state::table
            .filter(source_state::source.eq(source))
            .select((
                source_state::source,
                source_state::last_run,
                source_state::last_count,
                source_state::updated_at,
            ))
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(|(source, last_run, last_count, updated_at)| Watermark {
            source,
            last_run,
            last_count,
            updated_at,
        }))
    }

    async fn set_watermark(
        &self,
        source: &str,
        last_run: DateTime<Utc>,
        last_count: i64,
    ) -> Result<(), EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::sql_query(
            "INSERT INTO source_state (source, last_run, last_count, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (source) DO UPDATE SET last_run = EXCLUDED.last_run, \
             last_count = EXCLUDED.last_count, updated_at = now()",
        )
        .bind::<Text, _>(source)
        .bind::<Timestamptz, _>(last_run)
        .bind::<Int8, _>(last_count)
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn list_places(&self) -> Result<Vec<PlaceSummary>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        #[derive(QueryableByName)]
        struct PlaceSummaryRow {
            #[diesel(sql_type = SqlUuid)]
            id: Uuid,
            #[diesel(sql_type = Text)]
            entity_type: String,
            #[diesel(sql_type = Timestamptz)]
            t_start: DateTime<Utc>,
            #[diesel(sql_type = Nullable<Timestamptz>)]
            t_end: Option<DateTime<Utc>>,
            #[diesel(sql_type = Nullable<Float8>)]
            lat: Option<f64>,
            #[diesel(sql_type = Nullable<Float8>)]
            lon: Option<f64>,
            #[diesel(sql_type = Nullable<Text>)]
            name: Option<String>,
            #[diesel(sql_type = Nullable<Text>)]
            color: Option<String>,
            #[diesel(sql_type = diesel::sql_types::Float8)]
            render_offset: f64,
            #[diesel(sql_type = Nullable<Text>)]
            source: Option<String>,
            #[diesel(sql_type = Nullable<Text>)]
            external_id: Option<String>,
            #[diesel(sql_type = Nullable<Text>)]
            loc_source: Option<String>,
            #[diesel(sql_type = Nullable<Jsonb>)]
            payload: Option<Value>,
            #[diesel(sql_type = Timestamptz)]
            created_at: DateTime<Utc>,
            #[diesel(sql_type = Timestamptz)]
            updated_at: DateTime<Utc>,
            #[diesel(sql_type = Int8)]
            visit_count: i64,
            #[diesel(sql_type = diesel::sql_types::Float8)]
            total_dwell_minutes: f64,
        }

        // `p.id` is the primary key, so Postgres allows grouping by it
        // alone and projecting the rest of `p`'s columns by functional
        // dependency.
        let sql = "SELECT p.id, p.type AS entity_type, p.t_start, p.t_end, p.lat, p.lon, \
             p.name, p.color, p.render_offset, p.source, p.external_id, p.loc_source, \
             p.payload, p.created_at, p.updated_at, \
             count(v.id) AS visit_count, \
             coalesce(sum((v.payload->>'dwellMinutes')::float8), 0) AS total_dwell_minutes \
             FROM entities p \
             LEFT JOIN entities v ON v.type = 'place.visit' AND v.payload->>'placeId' = p.id::text \
             WHERE p.type = 'place' \
             GROUP BY p.id \
             ORDER BY p.t_start ASC";

        let rows: Vec<PlaceSummaryRow> = diesel::sql_query(sql)
            .get_results(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let entity = Entity::from(EntityRow {
                    id: row.id,
                    entity_type: row.entity_type,
                    t_start: row.t_start,
                    t_end: row.t_end,
                    lat: row.lat,
                    lon: row.lon,
                    name: row.name,
                    color: row.color,
                    render_offset: row.render_offset,
                    source: row.source,
                    external_id: row.external_id,
                    loc_source: row.loc_source,
                    payload: row.payload,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                });
                PlaceSummary {
                    entity,
                    visit_count: row.visit_count,
                    total_dwell_minutes: row.total_dwell_minutes,
                }
            })
            .collect())
    }

    async fn get_place(&self, id: Uuid) -> Result<Option<PlaceDetail>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let place_sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1 AND type = 'place'");
        let place: Option<EntityRow> = diesel::sql_query(place_sql)
            .bind::<SqlUuid, _>(id)
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        let Some(place) = place else {
            return Ok(None);
        };

        let visits_sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE type = 'place.visit' AND payload->>'placeId' = $1 \
             ORDER BY t_start DESC LIMIT 20"
        );
        let visits: Vec<EntityRow> = diesel::sql_query(visits_sql)
            .bind::<Text, _>(id.to_string())
            .get_results(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(Some(PlaceDetail {
            entity: Entity::from(place),
            recent_visits: visits.into_iter().map(Entity::from).collect(),
        }))
    }

    async fn rename_place(
        &self,
        id: Uuid,
        name: String,
        color: Option<String>,
    ) -> Result<RenamePlaceOutcome, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let place_sql = format!(
            "UPDATE entities SET name = $2, color = $3, updated_at = now() \
             WHERE id = $1 AND type = 'place' RETURNING {ENTITY_COLUMNS}"
        );
        let place: Option<EntityRow> = diesel::sql_query(place_sql)
            .bind::<SqlUuid, _>(id)
            .bind::<Text, _>(&name)
            .bind::<Nullable<Text>, _>(&color)
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        let Some(place) = place else {
            return Err(EntityStoreError::not_found(format!("place {id} not found")));
        };

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = Int8)]
            count: i64,
        }
        let updated: CountRow = diesel::sql_query(
            "WITH updated AS ( \
                UPDATE entities SET name = $2, updated_at = now() \
                WHERE type = 'place.visit' AND payload->>'placeId' = $1::text \
                RETURNING id \
             ) SELECT count(*) AS count FROM updated",
        )
        .bind::<SqlUuid, _>(id)
        .bind::<Text, _>(&name)
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        Ok(RenamePlaceOutcome {
            place: Entity::from(place),
            updated_visits: updated.count.max(0) as u64,
        })
    }

    async fn delete_visits(&self, window: Option<TimeWindow>) -> Result<u64, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = Int8)]
            count: i64,
        }

        let row: CountRow = match window {
            Some(window) => diesel::sql_query(
                "WITH deleted AS ( \
                    DELETE FROM entities WHERE type = 'place.visit' AND t_range && tstzrange($1, $2, '[]') \
                    RETURNING id \
                 ) SELECT count(*) AS count FROM deleted",
            )
            .bind::<Timestamptz, _>(window.start)
            .bind::<Timestamptz, _>(window.end)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?,
            None => diesel::sql_query(
                "WITH deleted AS ( \
                    DELETE FROM entities WHERE type = 'place.visit' RETURNING id \
                 ) SELECT count(*) AS count FROM deleted",
            )
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?,
        };

        Ok(row.count.max(0) as u64)
    }

    async fn stats(&self) -> Result<StoreStats, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        #[derive(QueryableByName)]
        struct TotalsRow {
            #[diesel(sql_type = Int8)]
            total_entities: i64,
            #[diesel(sql_type = Nullable<Timestamptz>)]
            oldest: Option<DateTime<Utc>>,
            #[diesel(sql_type = Nullable<Timestamptz>)]
            newest: Option<DateTime<Utc>>,
        }
        let totals: TotalsRow = diesel::sql_query(
            "SELECT count(*) AS total_entities, min(t_start) AS oldest, max(t_start) AS newest FROM entities",
        )
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        #[derive(QueryableByName)]
        struct ByTypeRow {
            #[diesel(sql_type = Text)]
            entity_type: String,
            #[diesel(sql_type = Int8)]
            count: i64,
        }
        let by_type: Vec<ByTypeRow> = diesel::sql_query(
            "SELECT type AS entity_type, count(*) AS count FROM entities GROUP BY type ORDER BY type",
        )
        .get_results(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        #[derive(QueryableByName)]
        struct SizeRow {
            #[diesel(sql_type = diesel::sql_types::Float8)]
            database_size_mb: f64,
            #[diesel(sql_type = diesel::sql_types::Float8)]
            table_size_mb: f64,
            #[diesel(sql_type = diesel::sql_types::Float8)]
            index_size_mb: f64,
        }
        let sizes: SizeRow = diesel::sql_query(
            "SELECT pg_database_size(current_database()) / 1048576.0 AS database_size_mb, \
             pg_table_size('entities') / 1048576.0 AS table_size_mb, \
             pg_indexes_size('entities') / 1048576.0 AS index_size_mb",
        )
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)?;

        Ok(StoreStats {
            total_entities: totals.total_entities,
            entities_by_type: by_type.into_iter().map(|row| (row.entity_type, row.count)).collect(),
            oldest: totals.oldest,
            newest: totals.newest,
            database_size_mb: sizes.database_size_mb,
            table_size_mb: sizes.table_size_mb,
            index_size_mb: sizes.index_size_mb,
        })
    }
}

#[async_trait]
impl crate::domain::resolver::NativeFixLookup for DieselEntityStore {
    /// Most recent `location.gps` fix from `source` at or before
    /// `at_or_before`, used by the Location Enrichment Resolver (§4.3).
    async fn latest_fix(
        &self,
        source: &str,
        at_or_before: DateTime<Utc>,
    ) -> Result<Option<(f64, f64)>, crate::domain::Error> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| crate::domain::Error::from(map_pool_error(err)))?;

        #[derive(QueryableByName)]
        struct FixRow {
            #[diesel(sql_type = Float8)]
            lat: f64,
            #[diesel(sql_type = Float8)]
            lon: f64,
        }

        let row: Option<FixRow> = diesel::sql_query(
            "SELECT lat, lon FROM entities \
             WHERE type = 'location.gps' AND source = $1 AND t_start <= $2 \
             AND lat IS NOT NULL AND lon IS NOT NULL \
             ORDER BY t_start DESC LIMIT 1",
        )
        .bind::<Text, _>(source)
        .bind::<Timestamptz, _>(at_or_before)
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(|err| crate::domain::Error::from(map_diesel_error(err)))?;

        Ok(row.map(|row| (row.lat, row.lon)))
    }
}

struct StreamState {
    pool: DbPool,
    types: Vec<String>,
    order: ExportOrder,
    cursor: Option<(DateTime<Utc>, Uuid)>,
    buffer: std::collections::VecDeque<EntityRow>,
    exhausted: bool,
}

impl StreamState {
    async fn fetch_page(&mut self) -> Result<(), EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let (cmp, order_sql) = match self.order {
            ExportOrder::Newest => ("<", "DESC"),
            ExportOrder::Oldest => (">", "ASC"),
        };

        let rows: Vec<EntityRow> = match self.cursor {
            Some((t_start, id)) => {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities \
                     WHERE (cardinality($1) = 0 OR type = ANY($1)) \
                     AND (t_start, id) {cmp} ($2, $3) \
                     ORDER BY t_start {order_sql}, id {order_sql} LIMIT $4"
                );
                diesel::sql_query(sql)
                    .bind::<Array<Text>, _>(&self.types)
                    .bind::<Timestamptz, _>(t_start)
                    .bind::<SqlUuid, _>(id)
                    .bind::<Int8, _>(STREAM_PAGE_SIZE)
                    .get_results(&mut conn)
                    .await
                    .map_err(map_diesel_error)?
            }
            None => {
                let sql = format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities \
                     WHERE (cardinality($1) = 0 OR type = ANY($1)) \
                     ORDER BY t_start {order_sql}, id {order_sql} LIMIT $2"
                );
                diesel::sql_query(sql)
                    .bind::<Array<Text>, _>(&self.types)
                    .bind::<Int8, _>(STREAM_PAGE_SIZE)
                    .get_results(&mut conn)
                    .await
                    .map_err(map_diesel_error)?
            }
        };

        if rows.len() < STREAM_PAGE_SIZE as usize {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.cursor = Some((last.t_start, last.id));
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loc_source_str_round_trips_known_variants() {
        assert_eq!(loc_source_str(Some(LocSource::Native)), Some("native"));
        assert_eq!(loc_source_str(Some(LocSource::Inferred)), Some("inferred"));
        assert_eq!(loc_source_str(None), None);
    }
}
