//! Documents and business rules shared by the catering service: production
//! schedules, dispatches, shortages, recipes and the analytics arithmetic.

pub mod analytics;
pub mod dispatch;
pub mod recipe;
pub mod roles;
pub mod schedule;
pub mod shortage;
pub mod text;

pub use analytics::*;
pub use dispatch::*;
pub use recipe::*;
pub use roles::*;
pub use schedule::*;
pub use shortage::*;
pub use text::*;
