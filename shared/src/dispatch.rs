use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("branch {0} is not part of this dispatch")]
    BranchNotFound(String),
    #[error("item {item_id} not found for branch {branch}")]
    ItemNotFound { branch: String, item_id: String },
    #[error("a follow-up needs at least one item")]
    NoItems,
    #[error("quantities cannot be negative")]
    NegativeQuantity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchDispatchStatus {
    #[default]
    Pending,
    Packing,
    Dispatched,
    Receiving,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemIssue {
    Missing,
    Damaged,
    Short,
    Quality,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Scheduled,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    pub ordered_quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packed_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_quantity: Option<f64>,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ItemIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_status: Option<ResolutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_dispatch_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_item_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDispatch {
    pub branch_slug: String,
    pub branch_name: String,
    #[serde(default)]
    pub status: BranchDispatchStatus,
    #[serde(default)]
    pub items: Vec<DispatchItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One line of a branch update coming from the packing or receiving screen.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub item_id: String,
    pub packed_quantity: Option<f64>,
    pub received_quantity: Option<f64>,
    pub issue: Option<ItemIssue>,
    pub issue_notes: Option<String>,
    #[serde(default)]
    pub clear_issue: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchUpdate {
    pub branch_slug: String,
    pub status: Option<BranchDispatchStatus>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemUpdate>,
}

/// An item a branch reported as missing or wrong, to be re-delivered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedItem {
    pub branch_slug: String,
    pub branch_name: String,
    pub item_id: String,
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    pub reason: Option<String>,
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

impl BranchDispatch {
    pub fn fill_missing_ids(&mut self) {
        for item in self.items.iter_mut().filter(|i| i.id.is_empty()) {
            item.id = fresh_id();
        }
    }

    /// Applies an update and reports whether this call moved the branch into
    /// `completed`.
    pub fn apply(
        &mut self,
        update: &BranchUpdate,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DispatchError> {
        for change in &update.items {
            let negative = [change.packed_quantity, change.received_quantity]
                .iter()
                .flatten()
                .any(|q| *q < 0.0);
            if negative {
                return Err(DispatchError::NegativeQuantity);
            }
            let item = self
                .items
                .iter_mut()
                .find(|i| i.id == change.item_id)
                .ok_or_else(|| DispatchError::ItemNotFound {
                    branch: self.branch_slug.clone(),
                    item_id: change.item_id.clone(),
                })?;

            if let Some(q) = change.packed_quantity {
                item.packed_quantity = Some(q);
            }
            if let Some(q) = change.received_quantity {
                item.received_quantity = Some(q);
            }
            if change.clear_issue {
                item.issue = None;
                item.issue_notes = None;
            }
            if let Some(issue) = change.issue {
                item.issue = Some(issue);
            }
            if change.issue_notes.is_some() {
                item.issue_notes = change.issue_notes.clone();
            }
        }

        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }

        let was_completed = self.status == BranchDispatchStatus::Completed;
        if let Some(status) = update.status {
            self.status = status;
            let receiver = || update.received_by.clone().unwrap_or_else(|| by.to_string());
            match status {
                BranchDispatchStatus::Pending => {}
                BranchDispatchStatus::Packing => self.packed_at = Some(at),
                BranchDispatchStatus::Dispatched => self.dispatched_at = Some(at),
                BranchDispatchStatus::Receiving => {
                    self.received_at = Some(at);
                    self.received_by = Some(receiver());
                }
                BranchDispatchStatus::Completed => {
                    self.received_at.get_or_insert(at);
                    self.completed_at = Some(at);
                    if self.received_by.is_none() {
                        self.received_by = Some(receiver());
                    }
                }
            }
        }

        Ok(!was_completed && self.status == BranchDispatchStatus::Completed)
    }
}

/// Builds the branch documents of a follow-up dispatch: one per distinct
/// branch, in the order the branches first appear, each item carrying a fresh
/// ID and a link back to the item it replaces.
pub fn group_follow_up(items: &[FlaggedItem]) -> Result<Vec<BranchDispatch>, DispatchError> {
    if items.is_empty() {
        return Err(DispatchError::NoItems);
    }

    let mut branches: Vec<BranchDispatch> = Vec::new();
    for flagged in items {
        if flagged.quantity < 0.0 {
            return Err(DispatchError::NegativeQuantity);
        }
        let position = match branches.iter().position(|b| b.branch_slug == flagged.branch_slug) {
            Some(position) => position,
            None => {
                branches.push(BranchDispatch {
                    branch_slug: flagged.branch_slug.clone(),
                    branch_name: flagged.branch_name.clone(),
                    status: BranchDispatchStatus::Pending,
                    items: Vec::new(),
                    packed_at: None,
                    dispatched_at: None,
                    received_at: None,
                    completed_at: None,
                    received_by: None,
                    notes: None,
                });
                branches.len() - 1
            }
        };

        branches[position].items.push(DispatchItem {
            id: fresh_id(),
            name: flagged.name.clone(),
            recipe_id: None,
            ordered_quantity: flagged.quantity,
            packed_quantity: None,
            received_quantity: None,
            unit: flagged.unit.clone(),
            issue: None,
            issue_notes: flagged.reason.clone(),
            resolution_status: None,
            follow_up_dispatch_id: None,
            original_item_id: Some(flagged.item_id.clone()),
        });
    }

    Ok(branches)
}

/// Marks the parent items replaced by a follow-up as `scheduled`. Returns how
/// many parent items were touched.
pub fn mark_scheduled(
    parent: &mut [BranchDispatch],
    follow_up: &[BranchDispatch],
    follow_up_id: Uuid,
) -> usize {
    let mut touched = 0;
    for branch in follow_up {
        let Some(target) = parent.iter_mut().find(|b| b.branch_slug == branch.branch_slug) else {
            continue;
        };
        for original_id in branch.items.iter().filter_map(|i| i.original_item_id.as_deref()) {
            if let Some(item) = target.items.iter_mut().find(|i| i.id == original_id) {
                item.resolution_status = Some(ResolutionStatus::Scheduled);
                item.follow_up_dispatch_id = Some(follow_up_id);
                touched += 1;
            }
        }
    }
    touched
}

/// Marks the parent items re-delivered by a completed follow-up branch as
/// `resolved`.
pub fn mark_resolved(parent: &mut [BranchDispatch], completed: &BranchDispatch) -> usize {
    let Some(target) = parent.iter_mut().find(|b| b.branch_slug == completed.branch_slug) else {
        return 0;
    };
    let mut touched = 0;
    for original_id in completed.items.iter().filter_map(|i| i.original_item_id.as_deref()) {
        if let Some(item) = target.items.iter_mut().find(|i| i.id == original_id) {
            item.resolution_status = Some(ResolutionStatus::Resolved);
            touched += 1;
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parent() -> Vec<BranchDispatch> {
        serde_json::from_value(json!([
            {
                "branchSlug": "downtown",
                "branchName": "Downtown",
                "status": "completed",
                "items": [
                    {
                        "id": "d1", "name": "Biryani", "orderedQuantity": 10, "unit": "tray",
                        "issue": "missing"
                    },
                    {"id": "d2", "name": "Raita", "orderedQuantity": 5, "unit": "tub"}
                ]
            },
            {
                "branchSlug": "airport",
                "branchName": "Airport",
                "status": "completed",
                "items": [
                    {
                        "id": "a1", "name": "Biryani", "orderedQuantity": 8, "unit": "tray",
                        "issue": "damaged"
                    },
                    {
                        "id": "a2", "name": "Kheer", "orderedQuantity": 4, "unit": "tub",
                        "issue": "short"
                    }
                ]
            }
        ]))
        .unwrap()
    }

    fn flagged(branch: &str, item_id: &str) -> FlaggedItem {
        FlaggedItem {
            branch_slug: branch.to_string(),
            branch_name: branch.to_uppercase(),
            item_id: item_id.to_string(),
            name: format!("item {item_id}"),
            quantity: 2.0,
            unit: "tray".into(),
            reason: Some("re-delivery".into()),
        }
    }

    #[test]
    fn follow_up_has_one_branch_per_distinct_branch() {
        let items = [flagged("downtown", "d1"), flagged("airport", "a1"), flagged("airport", "a2")];
        let branches = group_follow_up(&items).unwrap();

        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].branch_slug, "downtown");
        assert_eq!(branches[1].branch_slug, "airport");
        for branch in &branches {
            let expected: Vec<_> = items
                .iter()
                .filter(|i| i.branch_slug == branch.branch_slug)
                .map(|i| Some(i.item_id.as_str()))
                .collect();
            let actual: Vec<_> =
                branch.items.iter().map(|i| i.original_item_id.as_deref()).collect();
            assert_eq!(actual, expected);
        }

        let ids: Vec<_> = branches
            .iter()
            .flat_map(|b| b.items.iter().map(|i| i.id.clone()))
            .collect();
        assert!(ids.iter().all(|id| !["d1", "a1", "a2"].contains(&id.as_str())));
    }

    #[test]
    fn follow_up_needs_items() {
        assert_eq!(group_follow_up(&[]).unwrap_err(), DispatchError::NoItems);
    }

    #[test]
    fn parent_items_become_scheduled_then_resolved() {
        let mut parent = parent();
        let follow_up_id = Uuid::new_v4();
        let mut follow_up =
            group_follow_up(&[flagged("downtown", "d1"), flagged("airport", "a2")]).unwrap();

        assert_eq!(mark_scheduled(&mut parent, &follow_up, follow_up_id), 2);
        assert_eq!(parent[0].items[0].resolution_status, Some(ResolutionStatus::Scheduled));
        assert_eq!(parent[0].items[0].follow_up_dispatch_id, Some(follow_up_id));
        assert_eq!(parent[0].items[1].resolution_status, None);
        assert_eq!(parent[1].items[0].resolution_status, None);
        assert_eq!(parent[1].items[1].resolution_status, Some(ResolutionStatus::Scheduled));

        let update = BranchUpdate {
            branch_slug: "airport".into(),
            status: Some(BranchDispatchStatus::Completed),
            ..Default::default()
        };
        assert!(follow_up[1].apply(&update, "manager@example.com", Utc::now()).unwrap());
        assert_eq!(mark_resolved(&mut parent, &follow_up[1]), 1);
        assert_eq!(parent[1].items[1].resolution_status, Some(ResolutionStatus::Resolved));
        assert_eq!(parent[0].items[0].resolution_status, Some(ResolutionStatus::Scheduled));
    }

    #[test]
    fn apply_records_quantities_and_issues() {
        let mut branch = parent().remove(1);
        branch.status = BranchDispatchStatus::Dispatched;
        let update = BranchUpdate {
            branch_slug: "airport".into(),
            status: Some(BranchDispatchStatus::Receiving),
            received_by: Some("Sam".into()),
            items: vec![
                ItemUpdate {
                    item_id: "a1".into(),
                    received_quantity: Some(8.0),
                    clear_issue: true,
                    ..Default::default()
                },
                ItemUpdate {
                    item_id: "a2".into(),
                    received_quantity: Some(2.0),
                    issue: Some(ItemIssue::Short),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let completed = branch.apply(&update, "manager@example.com", Utc::now()).unwrap();
        assert!(!completed);
        assert_eq!(branch.status, BranchDispatchStatus::Receiving);
        assert_eq!(branch.received_by.as_deref(), Some("Sam"));
        assert_eq!(branch.items[0].issue, None);
        assert_eq!(branch.items[1].received_quantity, Some(2.0));
        assert_eq!(branch.items[1].issue, Some(ItemIssue::Short));
    }

    #[test]
    fn apply_rejects_unknown_items_and_negative_quantities() {
        let mut branch = parent().remove(0);
        let unknown = BranchUpdate {
            branch_slug: "downtown".into(),
            items: vec![ItemUpdate { item_id: "nope".into(), ..Default::default() }],
            ..Default::default()
        };
        assert!(matches!(
            branch.apply(&unknown, "x", Utc::now()),
            Err(DispatchError::ItemNotFound { .. })
        ));

        let negative = BranchUpdate {
            branch_slug: "downtown".into(),
            items: vec![ItemUpdate {
                item_id: "d1".into(),
                packed_quantity: Some(-1.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(branch.apply(&negative, "x", Utc::now()), Err(DispatchError::NegativeQuantity));
    }

    #[test]
    fn completing_twice_only_reports_once() {
        let mut branch = parent().remove(0);
        let update = BranchUpdate {
            branch_slug: "downtown".into(),
            status: Some(BranchDispatchStatus::Completed),
            ..Default::default()
        };
        assert!(!branch.apply(&update, "x", Utc::now()).unwrap());
    }
}
