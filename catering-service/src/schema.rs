diesel::table! {
    dispatches (id) {
        id -> Uuid,
        dispatch_date -> Date,
        created_by -> Varchar,
        branch_dispatches -> Jsonb,
        parent_dispatch_id -> Nullable<Uuid>,
        follow_up_dispatch_ids -> Array<Uuid>,
        notes -> Nullable<Text>,
        version -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ingredient_shortages (id) {
        id -> Uuid,
        inventory_check_id -> Uuid,
        schedule_id -> Nullable<Varchar>,
        ingredient_name -> Varchar,
        required_quantity -> Numeric,
        available_quantity -> Numeric,
        shortfall -> Numeric,
        unit -> Varchar,
        priority -> Varchar,
        status -> Varchar,
        resolution_status -> Nullable<Varchar>,
        resolution_action -> Nullable<Varchar>,
        resolution_notes -> Nullable<Text>,
        resolved_by -> Nullable<Varchar>,
        resolved_at -> Nullable<Timestamptz>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    inventory_checks (id) {
        id -> Uuid,
        schedule_id -> Nullable<Varchar>,
        checked_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    production_schedules (schedule_id) {
        schedule_id -> Varchar,
        week_start -> Date,
        week_end -> Date,
        schedule_data -> Jsonb,
        version -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    recipe_instructions (recipe_id) {
        recipe_id -> Varchar,
        instruction_data -> Jsonb,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    recipes (recipe_id) {
        recipe_id -> Varchar,
        recipe_data -> Jsonb,
        version -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(ingredient_shortages -> inventory_checks (inventory_check_id));

diesel::allow_tables_to_appear_in_same_query!(
    dispatches,
    ingredient_shortages,
    inventory_checks,
    production_schedules,
    recipe_instructions,
    recipes,
);
