//! Allocation map and the global build session.
//!
//! Uses `thread_local!` + `RefCell` for safe mutable access in single-threaded
//! WASM. The Web Worker keeps the WASM module alive, so the session persists
//! across `handle_request` calls for the entire browser session.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::build::logic;
use crate::build::reducer::{self, SkillAction};
use crate::catalog::{Catalog, CatalogOverrides, ConfigMode, TreeId};
use crate::error::Result;

/// Node id → points spent. Absent key means 0; stored counts are always > 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation(BTreeMap<String, u32>);

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a plain id → points record, dropping zero entries.
    pub fn from_record(record: BTreeMap<String, u32>) -> Self {
        record.into_iter().collect()
    }

    pub fn points(&self, id: &str) -> u32 {
        self.0.get(id).copied().unwrap_or(0)
    }

    /// Set a node's points; 0 removes the key.
    pub fn set(&mut self, id: &str, points: u32) {
        if points == 0 {
            self.0.remove(id);
        } else {
            self.0.insert(id.to_string(), points);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(id, &p)| (id.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Points spent across every node.
    pub fn total(&self) -> u32 {
        self.0.values().fold(0, |sum, &p| sum.saturating_add(p))
    }

    pub fn as_record(&self) -> &BTreeMap<String, u32> {
        &self.0
    }
}

impl FromIterator<(String, u32)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Allocation(iter.into_iter().filter(|(_, p)| *p > 0).collect())
    }
}

/// Everything one planner tab needs: mode, its catalog, the point budget,
/// and the allocation being edited.
#[derive(Debug, Clone)]
pub struct BuildSession {
    mode: ConfigMode,
    catalog: Catalog,
    max_skill_points: u32,
    allocation: Allocation,
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new(ConfigMode::Main)
    }
}

impl BuildSession {
    /// Fresh session on the embedded catalog for `mode`. A catalog that fails
    /// to load degrades to the empty default catalog.
    pub fn new(mode: ConfigMode) -> Self {
        let catalog = load_catalog(mode);
        Self {
            mode,
            max_skill_points: catalog.max_skill_points(),
            catalog,
            allocation: Allocation::new(),
        }
    }

    pub fn mode(&self) -> ConfigMode {
        self.mode
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn max_skill_points(&self) -> u32 {
        self.max_skill_points
    }

    /// Run one reducer action. Returns true if the allocation changed.
    pub fn dispatch(&mut self, action: SkillAction) -> bool {
        let next = reducer::reduce(&self.allocation, &action, &self.catalog, self.max_skill_points);
        if next == self.allocation {
            return false;
        }
        self.allocation = next;
        true
    }

    /// Switch tree set. Points never carry over between catalogs, and the
    /// budget is reloaded before any new allocation is accepted.
    pub fn switch_mode(&mut self, mode: ConfigMode) {
        tracing::debug!("Switching planner mode {} -> {}", self.mode.as_str(), mode.as_str());
        self.allocation = Allocation::new();
        self.catalog = load_catalog(mode);
        self.max_skill_points = self.catalog.max_skill_points();
        self.mode = mode;
    }

    /// Replace the budget; values below 1 are raised to 1.
    pub fn set_max_skill_points(&mut self, max: u32) {
        self.max_skill_points = max.max(1);
    }

    /// Apply editor overrides to the live catalog. Existing points stay;
    /// states are recomputed on the next query.
    pub fn apply_overrides(&mut self, overrides: &CatalogOverrides) {
        self.catalog.apply_overrides(overrides);
    }

    pub fn points(&self, id: &str) -> u32 {
        self.allocation.points(id)
    }

    pub fn tree_points(&self, tree: TreeId) -> u32 {
        logic::tree_points(tree, &self.allocation, &self.catalog)
    }

    pub fn total_points(&self) -> u32 {
        self.allocation.total()
    }

    pub fn is_at_max_points(&self) -> bool {
        self.total_points() >= self.max_skill_points
    }
}

fn load_catalog(mode: ConfigMode) -> Catalog {
    Catalog::embedded(mode).unwrap_or_else(|e| {
        tracing::warn!("Failed to load {} catalog: {}", mode.as_str(), e);
        Catalog::default()
    })
}

thread_local! {
    static SESSION: RefCell<BuildSession> = RefCell::new(BuildSession::default());
}

/// Execute a closure with read access to the build session.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&BuildSession) -> R,
{
    SESSION.with(|s| f(&s.borrow()))
}

/// Execute a closure with mutable access to the build session.
pub fn with_session_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut BuildSession) -> R,
{
    SESSION.with(|s| f(&mut s.borrow_mut()))
}

/// Replace the entire build session.
pub fn replace_session(new_session: BuildSession) {
    SESSION.with(|s| {
        *s.borrow_mut() = new_session;
    });
}

/// Export the allocation map as JSON.
pub fn export_allocation_json() -> String {
    with_session(|s| serde_json::to_string(s.allocation()).unwrap_or_else(|_| "{}".to_string()))
}

/// Import an allocation map from JSON (bulk load, no rule checks).
pub fn import_allocation_json(json: &str) -> Result<()> {
    let record: BTreeMap<String, u32> = serde_json::from_str(json)?;
    with_session_mut(|s| s.dispatch(SkillAction::LoadState { skill_points: record }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_is_empty_main() {
        replace_session(BuildSession::default());
        with_session(|s| {
            assert_eq!(s.mode(), ConfigMode::Main);
            assert!(s.allocation().is_empty());
            assert_eq!(s.max_skill_points(), 76);
            assert!(!s.is_at_max_points());
        });
    }

    #[test]
    fn allocation_set_zero_removes_key() {
        let mut allocation = Allocation::new();
        allocation.set("a", 2);
        assert_eq!(allocation.points("a"), 2);
        allocation.set("a", 0);
        assert!(allocation.is_empty());
        assert_eq!(allocation.points("missing"), 0);
    }

    #[test]
    fn from_record_drops_zero_entries() {
        let record = BTreeMap::from([("a".to_string(), 0), ("b".to_string(), 2)]);
        let allocation = Allocation::from_record(record);
        assert_eq!(allocation.len(), 1);
        assert_eq!(allocation.total(), 2);
    }

    #[test]
    fn total_saturates_instead_of_overflowing() {
        let record = BTreeMap::from([("a".to_string(), u32::MAX), ("b".to_string(), 7)]);
        assert_eq!(Allocation::from_record(record).total(), u32::MAX);
    }

    #[test]
    fn session_sums_per_tree() {
        let mut session = BuildSession::default();
        session.dispatch(SkillAction::AddPoint { skill_id: "tree-a-node-0".into() });
        session.dispatch(SkillAction::AddPoint { skill_id: "tree-a-node-1".into() });
        session.dispatch(SkillAction::AddPoint { skill_id: "tree-b-node-0".into() });
        assert_eq!(session.tree_points(TreeId::A), 2);
        assert_eq!(session.tree_points(TreeId::B), 1);
        assert_eq!(session.tree_points(TreeId::C), 0);
        assert_eq!(session.total_points(), 3);
    }

    #[test]
    fn switch_mode_resets_points_and_budget() {
        let mut session = BuildSession::default();
        session.set_max_skill_points(10);
        session.dispatch(SkillAction::AddPoint { skill_id: "tree-a-node-0".into() });
        assert_eq!(session.total_points(), 1);

        session.switch_mode(ConfigMode::Proto);
        assert!(session.allocation().is_empty());
        assert_eq!(session.max_skill_points(), 40);
        assert!(session.catalog().contains("proto-a-0"));
    }

    #[test]
    fn budget_floor_is_one() {
        let mut session = BuildSession::default();
        session.set_max_skill_points(0);
        assert_eq!(session.max_skill_points(), 1);
    }

    #[test]
    fn import_export_roundtrip() {
        replace_session(BuildSession::default());
        with_session_mut(|s| {
            s.dispatch(SkillAction::SetPoints { skill_id: "tree-c-node-1".into(), points: 3 });
        });

        let json = export_allocation_json();
        assert!(json.contains("tree-c-node-1"));

        replace_session(BuildSession::default());
        with_session(|s| assert!(s.allocation().is_empty()));

        import_allocation_json(&json).unwrap();
        with_session(|s| assert_eq!(s.points("tree-c-node-1"), 3));

        replace_session(BuildSession::default());
    }

    #[test]
    fn import_invalid_json_returns_error() {
        assert!(import_allocation_json("not valid json {{{").is_err());
    }
}
