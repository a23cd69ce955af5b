// Diesel table definitions, kept in sync with repository::migrations.

diesel::table! {
    vehicles (id) {
        id -> Integer,
        brand -> Text,
        model -> Text,
        description -> Text,
        engine -> Text,
        period -> Text,
    }
}

diesel::table! {
    oil_specifications (id) {
        id -> Integer,
        vehicle_id -> Integer,
        fluid_type -> Text,
        viscosity -> Nullable<Text>,
        capacity -> Nullable<Text>,
        norm -> Nullable<Text>,
        recommendation -> Nullable<Text>,
        observation -> Nullable<Text>,
        source -> Text,
        external_type_id -> Nullable<Text>,
        confidence -> Nullable<Double>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    scraper_failures (id) {
        id -> Integer,
        vehicle_id -> Integer,
        error_kind -> Text,
        message -> Text,
        attempts -> Integer,
        last_attempt -> Text,
        next_attempt -> Nullable<Text>,
        resolved -> Integer,
        resolved_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::joinable!(oil_specifications -> vehicles (vehicle_id));
diesel::joinable!(scraper_failures -> vehicles (vehicle_id));

diesel::allow_tables_to_appear_in_same_query!(vehicles, oil_specifications, scraper_failures);
