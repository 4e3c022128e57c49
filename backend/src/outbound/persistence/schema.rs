//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the embedded migrations under
//! `backend/migrations` exactly. When a migration changes a table, update the
//! matching block here (or regenerate it with `diesel print-schema`).

diesel::table! {
    /// Fleet users. Managers and drivers log in with their username.
    users (username) {
        username -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        role -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    vehicles (vehicle_id) {
        vehicle_id -> Varchar,
        model -> Varchar,
        status -> Varchar,
        current_mileage -> Int8,
        last_oil_change -> Int8,
        last_tire_service -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    route_assignments (id) {
        id -> Int8,
        driver_id -> Varchar,
        vehicle_id -> Varchar,
        route_id -> Varchar,
        assigned_date -> Date,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    student_attendance (id) {
        id -> Int8,
        student_id -> Varchar,
        student_name -> Varchar,
        route_id -> Nullable<Varchar>,
        attendance_date -> Date,
        present -> Bool,
    }
}

diesel::table! {
    emergency_contacts (contact_id) {
        contact_id -> Varchar,
        name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        active -> Bool,
    }
}

diesel::table! {
    user_device_tokens (user_id, token) {
        user_id -> Varchar,
        token -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Key/value runtime switches such as `gps_enabled`.
    system_settings (key) {
        key -> Varchar,
        value -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only GPS samples.
    gps_locations (id) {
        id -> Int8,
        vehicle_id -> Varchar,
        latitude -> Float8,
        longitude -> Float8,
        speed -> Float8,
        heading -> Nullable<Float8>,
        timestamp -> Timestamptz,
        driver_id -> Varchar,
        route_id -> Nullable<Varchar>,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    route_plans (route_id, stop_number) {
        route_id -> Varchar,
        stop_number -> Int4,
        stop_name -> Varchar,
        latitude -> Float8,
        longitude -> Float8,
        planned_arrival -> Nullable<Varchar>,
        planned_departure -> Nullable<Varchar>,
        stop_duration_s -> Int4,
        stop_radius_m -> Float8,
    }
}

diesel::table! {
    /// Detected route deviations. `location` and `expected_location` hold
    /// `{latitude, longitude}` objects.
    route_deviations (id) {
        id -> Int8,
        vehicle_id -> Varchar,
        route_id -> Varchar,
        driver_id -> Varchar,
        deviation_type -> Varchar,
        severity -> Varchar,
        location -> Jsonb,
        expected_location -> Nullable<Jsonb>,
        distance -> Float8,
        duration_ms -> Int8,
        description -> Text,
        auto_resolved -> Bool,
        resolved_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        metadata -> Jsonb,
    }
}

diesel::table! {
    /// Notification content. `claimed_at` marks rows taken by a scheduler.
    notifications (id) {
        id -> Varchar,
        notification_type -> Varchar,
        priority -> Varchar,
        subject -> Text,
        message -> Text,
        data -> Jsonb,
        recipients -> Jsonb,
        channels -> Jsonb,
        scheduled_at -> Nullable<Timestamptz>,
        status -> Varchar,
        claimed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    notification_deliveries (id) {
        id -> Int8,
        notification_id -> Varchar,
        user_id -> Varchar,
        channel -> Varchar,
        status -> Varchar,
        delivered_at -> Timestamptz,
        error -> Nullable<Text>,
        metadata -> Jsonb,
    }
}

diesel::table! {
    notification_inbox (notification_id, user_id) {
        notification_id -> Varchar,
        user_id -> Varchar,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notification_preferences (user_id) {
        user_id -> Varchar,
        email_enabled -> Bool,
        sms_enabled -> Bool,
        push_enabled -> Bool,
        quiet_start -> Nullable<Varchar>,
        quiet_end -> Nullable<Varchar>,
        type_opt_in -> Jsonb,
        timezone -> Varchar,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(notification_deliveries -> notifications (notification_id));
diesel::joinable!(notification_inbox -> notifications (notification_id));
diesel::joinable!(route_assignments -> users (driver_id));
diesel::joinable!(route_assignments -> vehicles (vehicle_id));
diesel::joinable!(user_device_tokens -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    emergency_contacts,
    gps_locations,
    notification_deliveries,
    notification_inbox,
    notification_preferences,
    notifications,
    route_assignments,
    route_deviations,
    route_plans,
    student_attendance,
    system_settings,
    user_device_tokens,
    users,
    vehicles,
);
