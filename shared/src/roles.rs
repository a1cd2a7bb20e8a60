use serde::{Deserialize, Serialize};

use crate::text::{normalize_branch_name, normalize_station};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    OperationsLead,
    HeadChef,
    StationStaff,
    BranchManager,
    Staff,
}

/// Roles that plan and re-plan kitchen work.
pub const SCHEDULE_PLANNERS: &[Role] = &[Role::Admin, Role::OperationsLead, Role::HeadChef];

/// Roles that may record progress on a production item.
pub const SCHEDULE_WORKERS: &[Role] = &[
    Role::Admin,
    Role::OperationsLead,
    Role::HeadChef,
    Role::StationStaff,
];

pub const OPERATIONS: &[Role] = &[Role::Admin, Role::OperationsLead];

/// Who is making a request, as carried by the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub station_assignment: Option<String>,
}

impl Actor {
    pub fn is_one_of(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Station staff only touch work assigned to their own station.
    pub fn can_work_on(&self, assigned_to: Option<&str>) -> bool {
        if self.role != Role::StationStaff {
            return true;
        }
        match (self.station_assignment.as_deref(), assigned_to) {
            (Some(own), Some(assigned)) => normalize_station(own) == normalize_station(assigned),
            _ => false,
        }
    }

    /// Admins and operations see every branch; everyone else sees the branches
    /// assigned to them.
    pub fn sees_all_branches(&self) -> bool {
        self.is_one_of(&[Role::Admin, Role::OperationsLead, Role::HeadChef])
    }

    pub fn can_access_branch(&self, branch_slug: &str) -> bool {
        self.sees_all_branches() || self.branches.iter().any(|b| b == branch_slug)
    }

    /// Like `can_access_branch`, for branch names as spelled by the POS export.
    pub fn can_access_branch_named(&self, name: &str) -> bool {
        if self.sees_all_branches() {
            return true;
        }
        let key = normalize_branch_name(name);
        self.branches.iter().any(|b| normalize_branch_name(b) == key)
    }
}
