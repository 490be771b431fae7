table! {
    audit_log (id) {
        id -> Int4,
        actor -> Nullable<Int4>,
        action -> Varchar,
        context -> Varchar,
        context_id -> Varchar,
        data -> Jsonb,
        created_at -> Timestamp,
    }
}

table! {
    chapters (manual, id) {
        manual -> Uuid,
        id -> Int4,
        chapter -> Int4,
        section -> Nullable<Int4>,
        subsection -> Nullable<Int4>,
        clause -> Nullable<Int4>,
        depth -> Int2,
        title -> Varchar,
        content -> Text,
        parent -> Nullable<Int4>,
        index -> Int4,
    }
}

table! {
    events (id) {
        id -> Int4,
        user -> Int4,
        timestamp -> Timestamp,
        kind -> Varchar,
        is_unread -> Bool,
        data -> Bytea,
    }
}

table! {
    field_history (id) {
        id -> Int4,
        table_name -> Varchar,
        record_id -> Varchar,
        field_name -> Varchar,
        old_value -> Nullable<Jsonb>,
        new_value -> Nullable<Jsonb>,
        change_type -> crate::db::types::Change_type,
        changed_by -> Nullable<Int4>,
        changed_at -> Timestamp,
        revision -> Nullable<Int4>,
    }
}

table! {
    manuals (id) {
        id -> Uuid,
        title -> Varchar,
        organization -> Varchar,
        status -> crate::db::types::Manual_status,
        current_revision -> Nullable<Varchar>,
        effective_date -> Nullable<Date>,
        owner -> Int4,
        is_archived -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    revisions (id) {
        id -> Int4,
        manual -> Uuid,
        revision_number -> Varchar,
        status -> crate::db::types::Manual_status,
        snapshot -> Jsonb,
        changes_summary -> Text,
        affected_chapters -> Jsonb,
        created_at -> Timestamp,
        submitted_at -> Nullable<Timestamp>,
        submitted_by -> Nullable<Int4>,
        approved_at -> Nullable<Timestamp>,
        approved_by -> Nullable<Int4>,
        rejected_at -> Nullable<Timestamp>,
        rejected_by -> Nullable<Int4>,
        rejection_reason -> Nullable<Text>,
    }
}

table! {
    users (id) {
        id -> Int4,
        email -> Varchar,
        name -> Varchar,
        is_super -> Bool,
        permissions -> Int4,
    }
}

joinable!(audit_log -> users (actor));
joinable!(chapters -> manuals (manual));
joinable!(events -> users (user));
joinable!(field_history -> revisions (revision));
joinable!(field_history -> users (changed_by));
joinable!(revisions -> manuals (manual));

allow_tables_to_appear_in_same_query!(
    audit_log,
    chapters,
    events,
    field_history,
    manuals,
    revisions,
    users,
);
