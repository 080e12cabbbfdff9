diesel::table! {
    users (id) {
        id -> Int8,
        username -> Varchar,
        email -> Nullable<Text>,
        password_hash -> Text,
        password_salt -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sessions (token) {
        token -> Text,
        user_id -> Int8,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    datasets (id) {
        id -> Int8,
        owner_id -> Nullable<Int8>,
        file_name -> Varchar,
        uploaded_at -> Timestamptz,
        summary -> Jsonb,
        raw_data -> Jsonb,
    }
}

diesel::joinable!(sessions -> users (user_id));
diesel::joinable!(datasets -> users (owner_id));

diesel::allow_tables_to_appear_in_same_query!(users, sessions, datasets);
