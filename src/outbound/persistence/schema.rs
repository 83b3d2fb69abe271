//! Diesel table definitions for the PostgreSQL schema.
//!
//! `geom` is queried and written through raw SQL in
//! [`super::diesel_entity_store`] (PostGIS types have no first-class Diesel
//! mapping without the `postgis` crate, which the teacher stack does not
//! carry), so it is omitted here; every other column round-trips through
//! Diesel's query builder.

diesel::table! {
    entities (id) {
        id -> Uuid,
        #[sql_name = "type"]
        entity_type -> Text,
        t_start -> Timestamptz,
        t_end -> Nullable<Timestamptz>,
        lat -> Nullable<Float8>,
        lon -> Nullable<Float8>,
        name -> Nullable<Text>,
        color -> Nullable<Text>,
        render_offset -> Float8,
        source -> Nullable<Text>,
        external_id -> Nullable<Text>,
        loc_source -> Nullable<Text>,
        payload -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    source_state (source) {
        source -> Text,
        last_run -> Timestamptz,
        last_count -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(entities, source_state,);
