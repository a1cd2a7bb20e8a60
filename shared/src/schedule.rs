use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::text::normalize_station;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("day {0} not found in schedule")]
    DayNotFound(String),
    #[error("item {item_id} not found on {date}")]
    ItemNotFound { date: String, item_id: String },
    #[error("item {item_id} appears more than once on {date}")]
    DuplicateItem { date: String, item_id: String },
    #[error("quantity must be a positive number")]
    InvalidQuantity,
    #[error("item is already scheduled on {0}")]
    SameDay(String),
}

/// A week of production work, stored as one JSON document per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSchedule {
    pub schedule_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    #[serde(default)]
    pub days: Vec<ProductionDay>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionDay {
    pub date: String,
    #[serde(default)]
    pub day_name: String,
    #[serde(default)]
    pub items: Vec<ProductionItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRecipeProgress {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionItem {
    pub item_id: String,
    pub recipe_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reassigned_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reassignment_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_recipe_progress: BTreeMap<String, SubRecipeProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reschedule_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_adjusted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub schedule_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_items: usize,
    pub completed_items: usize,
}

/// An item as seen from a station's task list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationTask {
    pub schedule_id: String,
    pub date: String,
    #[serde(flatten)]
    pub item: ProductionItem,
}

impl ProductionItem {
    pub fn new(
        item_id: impl Into<String>,
        recipe_name: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            recipe_name: recipe_name.into(),
            recipe_id: None,
            quantity,
            unit: unit.into(),
            assigned_to: None,
            assigned_at: None,
            assigned_by: None,
            reassigned_from: None,
            reassignment_reason: None,
            started_at: None,
            completed: false,
            completed_at: None,
            completed_by: None,
            sub_recipe_progress: BTreeMap::new(),
            rescheduled_from: None,
            rescheduled_at: None,
            reschedule_reason: None,
            original_quantity: None,
            quantity_adjusted_at: None,
            adjustment_reason: None,
            notes: None,
            extra: Map::new(),
        }
    }

    pub fn assign(&mut self, station: &str, by: &str, at: DateTime<Utc>) {
        self.assigned_to = Some(station.to_string());
        self.assigned_at = Some(at);
        self.assigned_by = Some(by.to_string());
    }

    pub fn reassign(&mut self, station: &str, by: &str, reason: Option<String>, at: DateTime<Utc>) {
        self.reassigned_from = self.assigned_to.take();
        self.reassignment_reason = reason;
        self.assign(station, by, at);
    }

    /// Keeps the first start time if the item was already started.
    pub fn start(&mut self, at: DateTime<Utc>) {
        self.started_at.get_or_insert(at);
    }

    pub fn set_completed(&mut self, completed: bool, by: &str, at: DateTime<Utc>) {
        self.completed = completed;
        if completed {
            self.started_at.get_or_insert(at);
            self.completed_at = Some(at);
            self.completed_by = Some(by.to_string());
        } else {
            self.completed_at = None;
            self.completed_by = None;
        }
    }

    /// `originalQuantity` records the planned figure from before the first
    /// adjustment and is not overwritten by later ones.
    pub fn adjust_quantity(
        &mut self,
        quantity: f64,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ScheduleError::InvalidQuantity);
        }
        self.original_quantity.get_or_insert(self.quantity);
        self.quantity = quantity;
        self.quantity_adjusted_at = Some(at);
        self.adjustment_reason = reason;
        Ok(())
    }

    pub fn set_sub_recipe_progress(
        &mut self,
        sub_recipe: &str,
        completed: bool,
        by: &str,
        at: DateTime<Utc>,
    ) {
        let progress = if completed {
            SubRecipeProgress {
                completed: true,
                completed_at: Some(at),
                completed_by: Some(by.to_string()),
            }
        } else {
            SubRecipeProgress { completed: false, completed_at: None, completed_by: None }
        };
        self.sub_recipe_progress.insert(sub_recipe.to_string(), progress);
    }

    pub fn is_assigned_to(&self, station: &str) -> bool {
        self.assigned_to
            .as_deref()
            .is_some_and(|assigned| normalize_station(assigned) == normalize_station(station))
    }
}

impl ProductionSchedule {
    /// Rejects documents where an item ID repeats within a day.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for day in &self.days {
            let mut seen = HashSet::new();
            for item in &day.items {
                if !seen.insert(item.item_id.as_str()) {
                    return Err(ScheduleError::DuplicateItem {
                        date: day.date.clone(),
                        item_id: item.item_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn day(&self, date: &str) -> Result<&ProductionDay, ScheduleError> {
        self.days
            .iter()
            .find(|d| d.date == date)
            .ok_or_else(|| ScheduleError::DayNotFound(date.to_string()))
    }

    pub fn item(&self, date: &str, item_id: &str) -> Result<&ProductionItem, ScheduleError> {
        self.day(date)?
            .items
            .iter()
            .find(|i| i.item_id == item_id)
            .ok_or_else(|| ScheduleError::ItemNotFound {
                date: date.to_string(),
                item_id: item_id.to_string(),
            })
    }

    pub fn item_mut(
        &mut self,
        date: &str,
        item_id: &str,
    ) -> Result<&mut ProductionItem, ScheduleError> {
        let day = self
            .days
            .iter_mut()
            .find(|d| d.date == date)
            .ok_or_else(|| ScheduleError::DayNotFound(date.to_string()))?;
        day.items
            .iter_mut()
            .find(|i| i.item_id == item_id)
            .ok_or_else(|| ScheduleError::ItemNotFound {
                date: date.to_string(),
                item_id: item_id.to_string(),
            })
    }

    /// Moves an item to another day of the same schedule. The item loses its
    /// station assignment and progress; it is planned afresh on the new day.
    pub fn reschedule(
        &mut self,
        date: &str,
        item_id: &str,
        new_date: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&ProductionItem, ScheduleError> {
        if date == new_date {
            return Err(ScheduleError::SameDay(new_date.to_string()));
        }

        let from = self
            .days
            .iter()
            .position(|d| d.date == date)
            .ok_or_else(|| ScheduleError::DayNotFound(date.to_string()))?;
        let to = self
            .days
            .iter()
            .position(|d| d.date == new_date)
            .ok_or_else(|| ScheduleError::DayNotFound(new_date.to_string()))?;
        let index = self.days[from]
            .items
            .iter()
            .position(|i| i.item_id == item_id)
            .ok_or_else(|| ScheduleError::ItemNotFound {
                date: date.to_string(),
                item_id: item_id.to_string(),
            })?;

        if self.days[to].items.iter().any(|i| i.item_id == item_id) {
            return Err(ScheduleError::DuplicateItem {
                date: new_date.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let mut item = self.days[from].items.remove(index);
        item.rescheduled_from = Some(date.to_string());
        item.rescheduled_at = Some(at);
        item.reschedule_reason = reason;
        item.assigned_to = None;
        item.assigned_at = None;
        item.assigned_by = None;
        item.started_at = None;
        item.completed = false;
        item.completed_at = None;
        item.completed_by = None;

        let target = &mut self.days[to].items;
        target.push(item);
        Ok(&target[target.len() - 1])
    }

    pub fn summary(&self) -> ScheduleSummary {
        let items = self.days.iter().flat_map(|d| d.items.iter());
        let (total_items, completed_items) = items.fold((0, 0), |(total, done), item| {
            (total + 1, done + usize::from(item.completed))
        });
        ScheduleSummary {
            schedule_id: self.schedule_id.clone(),
            week_start: self.week_start,
            week_end: self.week_end,
            total_items,
            completed_items,
        }
    }

    pub fn station_tasks(&self, date: &str, station: &str) -> Vec<StationTask> {
        let Ok(day) = self.day(date) else {
            return Vec::new();
        };
        day.items
            .iter()
            .filter(|item| item.is_assigned_to(station))
            .map(|item| StationTask {
                schedule_id: self.schedule_id.clone(),
                date: day.date.clone(),
                item: item.clone(),
            })
            .collect()
    }
}
