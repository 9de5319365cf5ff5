//! Reducer over the allocation map.
//!
//! Every mutation is a [`SkillAction`] fed through [`reduce`], which returns
//! the next allocation. Rejected actions return the state unchanged; the UI
//! is expected to read `can_add_point` / `can_remove_point` before asking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::build::logic;
use crate::build::state::Allocation;
use crate::catalog::Catalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum SkillAction {
    AddPoint { skill_id: String },
    RemovePoint { skill_id: String },
    /// Administrative override: clamps to `[0, maxPoints]` and skips every rule.
    SetPoints { skill_id: String, points: i64 },
    /// Same as `SetPoints` with 1.
    Unlock { skill_id: String },
    /// Same as `SetPoints` with 0.
    Lock { skill_id: String },
    ResetAll,
    /// Replace the map wholesale (restoring a shared build).
    LoadState { skill_points: BTreeMap<String, u32> },
}

/// Apply `action` to `state`. The global budget is inclusive: a point that
/// lands the total exactly on `max_skill_points` is accepted.
pub fn reduce(
    state: &Allocation,
    action: &SkillAction,
    catalog: &Catalog,
    max_skill_points: u32,
) -> Allocation {
    match action {
        SkillAction::AddPoint { skill_id } => {
            let Some(node) = catalog.node(skill_id) else {
                return rejected(state, action, "unknown skill");
            };
            if !logic::can_add_point(node, state, catalog) {
                return rejected(state, action, "skill not available");
            }
            if state.total() >= max_skill_points {
                return rejected(state, action, "point budget spent");
            }
            let mut next = state.clone();
            next.set(skill_id, state.points(skill_id) + 1);
            next
        }
        SkillAction::RemovePoint { skill_id } => {
            if !logic::can_remove_point(skill_id, state, catalog) {
                return rejected(state, action, "removal would break the build");
            }
            let mut next = state.clone();
            next.set(skill_id, state.points(skill_id) - 1);
            next
        }
        SkillAction::SetPoints { skill_id, points } => set_points(state, action, catalog, skill_id, *points),
        SkillAction::Unlock { skill_id } => set_points(state, action, catalog, skill_id, 1),
        SkillAction::Lock { skill_id } => set_points(state, action, catalog, skill_id, 0),
        SkillAction::ResetAll => Allocation::new(),
        SkillAction::LoadState { skill_points } => Allocation::from_record(skill_points.clone()),
    }
}

fn set_points(
    state: &Allocation,
    action: &SkillAction,
    catalog: &Catalog,
    skill_id: &str,
    points: i64,
) -> Allocation {
    let Some(node) = catalog.node(skill_id) else {
        return rejected(state, action, "unknown skill");
    };
    let clamped = points.clamp(0, i64::from(node.max_points()));
    let mut next = state.clone();
    next.set(skill_id, u32::try_from(clamped).unwrap_or(0));
    next
}

fn rejected(state: &Allocation, action: &SkillAction, reason: &str) -> Allocation {
    tracing::debug!(?action, reason, "skill action rejected");
    state.clone()
}
