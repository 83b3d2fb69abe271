//! Integration tests for `DieselEntityStore` against embedded PostgreSQL.
//!
//! These tests validate the Store port contract (§4) using
//! `pg-embedded-setup-unpriv` for isolated PostgreSQL instances, following
//! the same shared-cluster/per-test-database pattern as the other Diesel
//! adapter suites in this crate.

use backend::domain::entity::NewEntity;
use backend::domain::ports::{
    BboxOrder, BboxQuery, BoundingBox, EntityStore, ExportFilter, ExportOrder, ResampleBin,
    TimeOrder, TimeQuery, TimeWindow, UpsertOutcome,
};
use backend::outbound::persistence::{DbPool, DieselEntityStore, PoolConfig};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use pg_embedded_setup_unpriv::TemporaryDatabase;
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;

mod support;

use support::atexit_cleanup::shared_cluster_handle;
use support::{handle_cluster_setup_failure, provision_template_database};

struct TestContext {
    runtime: Runtime,
    store: DieselEntityStore,
    _database: TemporaryDatabase,
}

fn fix(minutes_ago: i64, lat: f64, lon: f64) -> NewEntity {
    NewEntity {
        entity_type: "location.gps".to_owned(),
        t_start: Utc::now() - ChronoDuration::minutes(minutes_ago),
        lat: Some(lat),
        lon: Some(lon),
        ..Default::default()
    }
}

fn setup_context() -> Result<TestContext, String> {
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let cluster = shared_cluster_handle().map_err(|err| err.to_string())?;
    let temp_db = provision_template_database(cluster)?;
    let database_url = temp_db.url().to_string();

    let config = PoolConfig::new(&database_url)
        .with_max_size(2)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(async { DbPool::new(config).await })
        .map_err(|err| err.to_string())?;

    Ok(TestContext {
        runtime,
        store: DieselEntityStore::new(pool),
        _database: temp_db,
    })
}

#[fixture]
fn store_context() -> Option<TestContext> {
    match setup_context() {
        Ok(ctx) => Some(ctx),
        Err(reason) => handle_cluster_setup_failure(reason),
    }
}

#[rstest]
fn upsert_inserts_then_updates_on_dedup_key(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: upsert_inserts_then_updates_on_dedup_key skipped");
        return;
    };

    context.runtime.block_on(async {
        let mut entity = fix(10, 51.5, -0.1);
        entity.source = Some("phone".to_owned());
        entity.external_id = Some("fix-1".to_owned());

        let (id, outcome) = context.store.upsert(entity.clone()).await.expect("insert");
        assert_eq!(outcome, UpsertOutcome::Inserted);

        entity.lat = Some(52.0);
        let (id_again, outcome) = context.store.upsert(entity).await.expect("update");
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(id, id_again);

        let window = TimeWindow {
            start: Utc::now() - ChronoDuration::hours(1),
            end: Utc::now(),
        };
        let rows = context
            .store
            .query_time(TimeQuery {
                types: vec!["location.gps".to_owned()],
                window,
                limit: 10,
                order: TimeOrder::Desc,
            })
            .await
            .expect("query_time");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].lat, Some(52.0));
    });
}

#[rstest]
fn bulk_upsert_round_trips_every_row(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: bulk_upsert_round_trips_every_row skipped");
        return;
    };

    context.runtime.block_on(async {
        let entities: Vec<NewEntity> = (0..5).map(|i| fix(i, 10.0 + i as f64, 20.0)).collect();
        let outcomes = context
            .store
            .bulk_upsert(entities)
            .await
            .expect("bulk_upsert");
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|(_, outcome)| *outcome == UpsertOutcome::Inserted));
    });
}

#[rstest]
fn query_time_orders_and_limits(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: query_time_orders_and_limits skipped");
        return;
    };

    context.runtime.block_on(async {
        for minutes_ago in [30, 20, 10] {
            context
                .store
                .upsert(fix(minutes_ago, 1.0, 1.0))
                .await
                .expect("seed");
        }

        let window = TimeWindow {
            start: Utc::now() - ChronoDuration::hours(1),
            end: Utc::now(),
        };
        let rows = context
            .store
            .query_time(TimeQuery {
                types: vec!["location.gps".to_owned()],
                window,
                limit: 2,
                order: TimeOrder::Asc,
            })
            .await
            .expect("query_time");

        assert_eq!(rows.len(), 2);
        assert!(rows[0].t_start < rows[1].t_start);
    });
}

#[rstest]
fn query_bbox_filters_by_envelope(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: query_bbox_filters_by_envelope skipped");
        return;
    };

    context.runtime.block_on(async {
        context.store.upsert(fix(5, 51.5, -0.1)).await.expect("inside");
        context.store.upsert(fix(5, 10.0, 10.0)).await.expect("outside");

        let rows = context
            .store
            .query_bbox(BboxQuery {
                types: vec!["location.gps".to_owned()],
                bbox: BoundingBox {
                    lon_min: -1.0,
                    lat_min: 51.0,
                    lon_max: 1.0,
                    lat_max: 52.0,
                },
                window: None,
                limit: 10,
                order: BboxOrder::TStartAsc,
            })
            .await
            .expect("query_bbox");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, Some(51.5));
    });
}

#[rstest]
fn query_resample_picks_closest_row_per_bin(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: query_resample_picks_closest_row_per_bin skipped");
        return;
    };

    context.runtime.block_on(async {
        let bin_start = Utc::now() - ChronoDuration::hours(1);
        let bin_end = Utc::now();
        let near_center = bin_start + ChronoDuration::minutes(29);
        let far_from_center = bin_start + ChronoDuration::minutes(5);

        let mut near = fix(0, 1.0, 1.0);
        near.t_start = near_center;
        let mut far = fix(0, 2.0, 2.0);
        far.t_start = far_from_center;

        context.store.upsert(near).await.expect("seed near");
        context.store.upsert(far).await.expect("seed far");

        let center = bin_start + (bin_end - bin_start) / 2;
        let rows = context
            .store
            .query_resample(vec![ResampleBin {
                types: vec!["location.gps".to_owned()],
                bin_start,
                bin_end,
                center,
            }])
            .await
            .expect("query_resample");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, Some(1.0));
    });
}

#[rstest]
fn stream_all_yields_every_row_and_reports_count(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: stream_all_yields_every_row_and_reports_count skipped");
        return;
    };

    context.runtime.block_on(async {
        for minutes_ago in 0..3 {
            context
                .store
                .upsert(fix(minutes_ago, 0.0, 0.0))
                .await
                .expect("seed");
        }

        let (count, mut stream) = context
            .store
            .stream_all(ExportFilter {
                types: Some(vec!["location.gps".to_owned()]),
                order: ExportOrder::Newest,
            })
            .await
            .expect("stream_all");
        assert_eq!(count, 3);

        let mut seen = 0;
        while let Some(row) = stream.next().await {
            row.expect("row");
            seen += 1;
        }
        assert_eq!(seen, 3);
    });
}

#[rstest]
fn watermark_round_trips_through_get_and_set(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: watermark_round_trips_through_get_and_set skipped");
        return;
    };

    context.runtime.block_on(async {
        assert!(context
            .store
            .get_watermark("test-source")
            .await
            .expect("get")
            .is_none());

        let last_run = Utc::now();
        context
            .store
            .set_watermark("test-source", last_run, 42)
            .await
            .expect("set");

        let watermark = context
            .store
            .get_watermark("test-source")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(watermark.last_count, 42);
    });
}

#[rstest]
fn place_lifecycle_lists_gets_renames_and_propagates(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: place_lifecycle_lists_gets_renames_and_propagates skipped");
        return;
    };

    context.runtime.block_on(async {
        let mut place = fix(60, 51.5, -0.1);
        place.entity_type = "place".to_owned();
        place.name = Some("Home".to_owned());
        let (place_id, _) = context.store.upsert(place).await.expect("insert place");

        let mut visit = fix(30, 51.5, -0.1);
        visit.entity_type = "place.visit".to_owned();
        visit.payload = Some(backend::domain::EntityPayload::from_type_and_value(
            "place.visit",
            serde_json::json!({ "placeId": place_id.to_string(), "dwellMinutes": 15.0 }),
        ));
        context.store.upsert(visit).await.expect("insert visit");

        let summaries = context.store.list_places().await.expect("list_places");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].visit_count, 1);

        let detail = context
            .store
            .get_place(place_id)
            .await
            .expect("get_place")
            .expect("present");
        assert_eq!(detail.recent_visits.len(), 1);

        let outcome = context
            .store
            .rename_place(place_id, "Flat".to_owned(), None)
            .await
            .expect("rename_place");
        assert_eq!(outcome.place.name.as_deref(), Some("Flat"));
        assert_eq!(outcome.updated_visits, 1);

        let deleted = context.store.delete_visits(None).await.expect("delete_visits");
        assert_eq!(deleted, 1);
    });
}

#[rstest]
fn stats_reports_totals_and_type_breakdown(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: stats_reports_totals_and_type_breakdown skipped");
        return;
    };

    context.runtime.block_on(async {
        context.store.upsert(fix(5, 1.0, 1.0)).await.expect("seed");
        context.store.upsert(fix(10, 2.0, 2.0)).await.expect("seed");

        let stats = context.store.stats().await.expect("stats");
        assert_eq!(stats.total_entities, 2);
        assert!(stats
            .entities_by_type
            .iter()
            .any(|(entity_type, count)| entity_type == "location.gps" && *count == 2));
        assert!(stats.oldest.is_some());
        assert!(stats.newest.is_some());
    });
}
