pub mod analytics;
pub mod dispatch;
pub mod recipes;
pub mod schedules;
pub mod shortages;
pub mod stations;
