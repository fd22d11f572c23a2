// Kept in sync with migrations/ by hand; column order matches the Queryable models.

diesel::table! {
    audit_log (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        #[max_length = 100]
        actor -> Varchar,
        #[max_length = 16]
        action -> Varchar,
        #[max_length = 64]
        entity_type -> Varchar,
        entity_id -> Text,
        before -> Nullable<Jsonb>,
        after -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    builders (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        #[max_length = 255]
        name -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    channel_accounts (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        #[max_length = 64]
        channel_key -> Varchar,
        #[max_length = 255]
        display_name -> Nullable<Varchar>,
        credentials -> Jsonb,
        brand_diet -> Nullable<Json>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    content_items (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        #[max_length = 255]
        title -> Nullable<Varchar>,
        body -> Text,
        #[max_length = 100]
        content_category -> Nullable<Varchar>,
        #[max_length = 100]
        created_by -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    customers (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        #[max_length = 255]
        name -> Varchar,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 64]
        phone -> Nullable<Varchar>,
        address_line1 -> Nullable<Text>,
        address_line2 -> Nullable<Text>,
        #[max_length = 128]
        city -> Nullable<Varchar>,
        #[max_length = 64]
        state -> Nullable<Varchar>,
        #[max_length = 32]
        postal_code -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    job_tasks (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        job_id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 32]
        status -> Varchar,
        #[max_length = 100]
        assigned_to -> Nullable<Varchar>,
        due_date -> Nullable<Date>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    jobs (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        builder_id -> Uuid,
        #[max_length = 255]
        community -> Varchar,
        #[max_length = 64]
        lot_number -> Varchar,
        #[max_length = 64]
        phase -> Varchar,
        #[max_length = 32]
        status -> Varchar,
        address -> Nullable<Text>,
        #[max_length = 255]
        tech_name -> Nullable<Varchar>,
        #[max_length = 100]
        assigned_to -> Nullable<Varchar>,
        warranty_start -> Nullable<Date>,
        warranty_end -> Nullable<Date>,
        warranty_notes -> Nullable<Text>,
        completion_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    marketing_channels (key) {
        #[max_length = 64]
        key -> Varchar,
        #[max_length = 255]
        display_name -> Varchar,
        supports_autopost -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    media_assets (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        content_item_id -> Nullable<Uuid>,
        #[max_length = 255]
        file_name -> Varchar,
        file_url -> Text,
        #[max_length = 16]
        file_type -> Varchar,
        file_size -> Nullable<Int8>,
        #[max_length = 100]
        mime_type -> Nullable<Varchar>,
        intent_tags -> Array<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    post_instances (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        channel_ids -> Array<Uuid>,
        content_item_id -> Nullable<Uuid>,
        body_text -> Nullable<Text>,
        scheduled_at -> Nullable<Timestamptz>,
        draft_due_date -> Nullable<Timestamptz>,
        #[max_length = 32]
        status -> Varchar,
        author_id -> Nullable<Uuid>,
        #[max_length = 100]
        author_username -> Nullable<Varchar>,
        #[max_length = 100]
        reviewer -> Nullable<Varchar>,
        #[max_length = 100]
        suggested_category -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        published_at -> Nullable<Timestamptz>,
        last_error -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    schema_revisions (revision) {
        #[max_length = 32]
        revision -> Varchar,
        #[max_length = 32]
        parent_revision -> Nullable<Varchar>,
        #[max_length = 255]
        name -> Varchar,
        position -> Int4,
        applied_at -> Timestamptz,
    }
}

diesel::table! {
    service_calls (id) {
        id -> Uuid,
        tenant_id -> Nullable<Text>,
        customer_id -> Nullable<Uuid>,
        job_id -> Nullable<Uuid>,
        #[max_length = 255]
        summary -> Varchar,
        description -> Nullable<Text>,
        #[max_length = 32]
        status -> Varchar,
        #[max_length = 32]
        priority -> Varchar,
        #[max_length = 100]
        assigned_to -> Nullable<Varchar>,
        requested_date -> Nullable<Date>,
        scheduled_start -> Nullable<Timestamptz>,
        scheduled_end -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        address -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        #[max_length = 100]
        username -> Varchar,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 255]
        hashed_password -> Varchar,
        #[max_length = 32]
        role -> Varchar,
        is_active -> Bool,
        tenant_id -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(channel_accounts -> marketing_channels (channel_key));
diesel::joinable!(job_tasks -> jobs (job_id));
diesel::joinable!(jobs -> builders (builder_id));
diesel::joinable!(media_assets -> content_items (content_item_id));
diesel::joinable!(post_instances -> content_items (content_item_id));
diesel::joinable!(post_instances -> users (author_id));
diesel::joinable!(service_calls -> customers (customer_id));
diesel::joinable!(service_calls -> jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(
    audit_log,
    builders,
    channel_accounts,
    content_items,
    customers,
    job_tasks,
    jobs,
    marketing_channels,
    media_assets,
    post_instances,
    schema_revisions,
    service_calls,
    users,
);
