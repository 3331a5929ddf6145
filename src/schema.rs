table! {
    qr_user (pk) {
        pk -> Int4,
        username -> Varchar,
        email -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        date_joined -> Timestamptz,
    }
}

table! {
    qr_code (pk) {
        pk -> Int4,
        fk_user -> Int4,
        created_at -> Timestamptz,
        image_name -> Varchar,
        image -> Bytea,
        is_valid -> Bool,
        last_used -> Nullable<Timestamptz>,
    }
}

joinable!(qr_code -> qr_user (fk_user));

allow_tables_to_appear_in_same_query!(
    qr_code,
    qr_user,
);
