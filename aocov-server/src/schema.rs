//! Diesel schema definitions for the ao-coverage server.

diesel::table! {
    repositories (id) {
        id -> Int4,
        organization -> Text,
        name -> Text,
        branches -> Jsonb,
        created_at -> Timestamp,
    }
}

diesel::table! {
    settings (id) {
        id -> Int4,
        upload_token_digest -> Text,
        updated_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(repositories, settings);
