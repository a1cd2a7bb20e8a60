use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use num_traits::ToPrimitive;
use serde::Serialize;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::production_schedules)]
pub struct DbProductionSchedule {
    pub schedule_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub schedule_data: serde_json::Value,
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::production_schedules)]
pub struct NewProductionSchedule {
    pub schedule_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub schedule_data: serde_json::Value,
    pub version: i32,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::dispatches)]
pub struct DbDispatch {
    pub id: Uuid,
    pub dispatch_date: NaiveDate,
    pub created_by: String,
    pub branch_dispatches: serde_json::Value,
    pub parent_dispatch_id: Option<Uuid>,
    pub follow_up_dispatch_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::dispatches)]
pub struct NewDispatch {
    pub id: Uuid,
    pub dispatch_date: NaiveDate,
    pub created_by: String,
    pub branch_dispatches: serde_json::Value,
    pub parent_dispatch_id: Option<Uuid>,
    pub follow_up_dispatch_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub version: i32,
}

/// A dispatch row with its branch documents decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    pub id: Uuid,
    pub dispatch_date: NaiveDate,
    pub created_by: String,
    pub branch_dispatches: Vec<BranchDispatch>,
    pub parent_dispatch_id: Option<Uuid>,
    pub follow_up_dispatch_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbDispatch> for Dispatch {
    type Error = serde_json::Error;

    fn try_from(row: DbDispatch) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            dispatch_date: row.dispatch_date,
            created_by: row.created_by,
            branch_dispatches: serde_json::from_value(row.branch_dispatches)?,
            parent_dispatch_id: row.parent_dispatch_id,
            follow_up_dispatch_ids: row.follow_up_dispatch_ids,
            notes: row.notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<DbProductionSchedule> for ProductionSchedule {
    type Error = serde_json::Error;

    fn try_from(row: DbProductionSchedule) -> Result<Self, Self::Error> {
        serde_json::from_value(row.schedule_data)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::ingredient_shortages)]
pub struct IngredientShortage {
    pub id: Uuid,
    pub inventory_check_id: Uuid,
    pub schedule_id: Option<String>,
    pub ingredient_name: String,
    pub required_quantity: BigDecimal,
    pub available_quantity: BigDecimal,
    pub shortfall: BigDecimal,
    pub unit: String,
    pub priority: String,
    pub status: String,
    pub resolution_status: Option<String>,
    pub resolution_action: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::ingredient_shortages, treat_none_as_null = true)]
pub struct ShortageResolutionChanges {
    pub resolution_status: Option<String>,
    pub resolution_action: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortageView {
    pub id: Uuid,
    pub inventory_check_id: Uuid,
    pub schedule_id: Option<String>,
    pub ingredient_name: String,
    pub required_quantity: f64,
    pub available_quantity: f64,
    pub shortfall: f64,
    pub unit: String,
    pub priority: String,
    pub status: String,
    pub resolution_status: Option<String>,
    pub resolution_action: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

pub fn decimal_to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

impl From<IngredientShortage> for ShortageView {
    fn from(row: IngredientShortage) -> Self {
        Self {
            id: row.id,
            inventory_check_id: row.inventory_check_id,
            schedule_id: row.schedule_id,
            ingredient_name: row.ingredient_name,
            required_quantity: decimal_to_f64(&row.required_quantity),
            available_quantity: decimal_to_f64(&row.available_quantity),
            shortfall: decimal_to_f64(&row.shortfall),
            unit: row.unit,
            priority: row.priority,
            status: row.status,
            resolution_status: row.resolution_status,
            resolution_action: row.resolution_action,
            resolution_notes: row.resolution_notes,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::recipes)]
pub struct DbRecipe {
    pub recipe_id: String,
    pub recipe_data: serde_json::Value,
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::recipes)]
pub struct NewRecipe {
    pub recipe_id: String,
    pub recipe_data: serde_json::Value,
    pub version: i32,
}

impl TryFrom<DbRecipe> for Recipe {
    type Error = serde_json::Error;

    fn try_from(row: DbRecipe) -> Result<Self, Self::Error> {
        let mut recipe: Recipe = serde_json::from_value(row.recipe_data)?;
        if recipe.recipe_id.is_empty() {
            recipe.recipe_id = row.recipe_id;
        }
        Ok(recipe)
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::recipe_instructions)]
pub struct DbRecipeInstructions {
    pub recipe_id: String,
    pub instruction_data: serde_json::Value,
    pub updated_at: Option<DateTime<Utc>>,
}
