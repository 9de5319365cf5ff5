//! Allocation rules: node state, add/remove legality, gate arithmetic.
//!
//! Everything here is a pure function of the catalog and an allocation map.
//! Rule violations are `false` / `Locked`, never errors, and ids missing from
//! the catalog count as unfunded.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::build::state::Allocation;
use crate::catalog::{Catalog, SkillNode, TreeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillState {
    Locked,
    Available,
    Unlocked,
}

impl SkillState {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillState::Locked => "locked",
            SkillState::Available => "available",
            SkillState::Unlocked => "unlocked",
        }
    }
}

/// State of `node` under `allocation`. First match wins:
/// funded → unlocked, tier 0 → available, gate unmet → locked,
/// then the prerequisite expression decides.
pub fn skill_state(node: &SkillNode, allocation: &Allocation, catalog: &Catalog) -> SkillState {
    if allocation.points(&node.id) > 0 {
        return SkillState::Unlocked;
    }

    if node.tier == 0 {
        return SkillState::Available;
    }

    let gate = node.gate();
    if gate > 0 && points_before_gate(node.tree, gate, allocation, catalog) < gate {
        return SkillState::Locked;
    }

    if node.prerequisites.is_empty() {
        return SkillState::Available;
    }

    let met = |id: &str| catalog.contains(id) && allocation.points(id) > 0;
    if node.prerequisites.is_satisfied(met) {
        SkillState::Available
    } else {
        SkillState::Locked
    }
}

/// Can one more point go into `node`? Budget is the caller's concern.
pub fn can_add_point(node: &SkillNode, allocation: &Allocation, catalog: &Catalog) -> bool {
    let current = allocation.points(&node.id);
    if current >= node.max_points() {
        return false;
    }
    // Topping up a funded node never re-checks gates or prerequisites.
    if current > 0 {
        return true;
    }
    skill_state(node, allocation, catalog) == SkillState::Available
}

/// Can one point come out of `id` without stranding another funded node?
pub fn can_remove_point(id: &str, allocation: &Allocation, catalog: &Catalog) -> bool {
    let current = allocation.points(id);
    if current == 0 {
        return false;
    }
    let Some(node) = catalog.node(id) else {
        return false;
    };

    let mut after = allocation.clone();
    after.set(id, current - 1);

    if !gates_hold_after_removal(node, allocation, &after, catalog) {
        return false;
    }

    if current == 1 {
        return !has_funded_dependent(id, allocation, &after, catalog);
    }

    true
}

/// Every gate still reached by another funded node in the same tree must
/// stay reached once the point is gone. Only gates at or above the node's
/// own gate can have counted its points.
fn gates_hold_after_removal(
    node: &SkillNode,
    before: &Allocation,
    after: &Allocation,
    catalog: &Catalog,
) -> bool {
    let own_gate = node.gate();
    let gates: BTreeSet<u32> = before
        .iter()
        .filter(|&(other, points)| other != node.id && points > 0)
        .filter_map(|(other, _)| catalog.node(other))
        .filter(|other| other.tree == node.tree && other.gate() > 0)
        .map(SkillNode::gate)
        .collect();

    gates
        .into_iter()
        .filter(|&gate| own_gate <= gate)
        .all(|gate| points_before_gate(node.tree, gate, after, catalog) >= gate)
}

fn has_funded_dependent(id: &str, before: &Allocation, after: &Allocation, catalog: &Catalog) -> bool {
    let met = |p: &str| after.points(p) > 0;
    before
        .iter()
        .filter(|&(other, points)| other != id && points > 0)
        .filter_map(|(other, _)| catalog.node(other))
        .any(|dependent| dependent.prerequisites.depends_on(id, met))
}

/// Points in `tree` that count toward reaching `gate`.
///
/// A node counts if its own gate is strictly below `gate` and nothing in
/// its prerequisite chain sits at or beyond `gate`; a node tagged gate 0
/// but chained behind a later gate must not leak its points backwards.
pub fn points_before_gate(tree: TreeId, gate: u32, allocation: &Allocation, catalog: &Catalog) -> u32 {
    allocation
        .iter()
        .filter_map(|(id, points)| catalog.node(id).map(|node| (node, points)))
        .filter(|(node, _)| node.tree == tree && node.gate() < gate)
        .filter(|(node, _)| !requires_gate(node, gate, catalog, &mut HashSet::new()))
        .fold(0, |sum, (_, points)| sum.saturating_add(points))
}

/// Does any ancestor of `node` carry a gate of at least `gate`?
fn requires_gate<'a>(
    node: &'a SkillNode,
    gate: u32,
    catalog: &'a Catalog,
    visited: &mut HashSet<&'a str>,
) -> bool {
    for prereq_id in node.prerequisites.ids() {
        let Some(prereq) = catalog.node(prereq_id) else {
            continue;
        };
        if prereq.gate() >= gate {
            return true;
        }
        if visited.insert(prereq_id) && requires_gate(prereq, gate, catalog, visited) {
            return true;
        }
    }
    false
}

/// Points spent on nodes of `tree`.
pub fn tree_points(tree: TreeId, allocation: &Allocation, catalog: &Catalog) -> u32 {
    allocation
        .iter()
        .filter(|(id, _)| catalog.node(id).is_some_and(|n| n.tree == tree))
        .fold(0, |sum, (_, points)| sum.saturating_add(points))
}

/// Nodes naming `id` in any prerequisite group.
pub fn dependent_skills<'a>(id: &str, catalog: &'a Catalog) -> Vec<&'a SkillNode> {
    catalog
        .nodes()
        .iter()
        .filter(|node| node.prerequisites.mentions(id))
        .collect()
}

/// One problem found by [`validate_allocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationIssue {
    UnknownSkill { id: String },
    OverMax { id: String, points: u32, max: u32 },
    Locked { id: String, points: u32 },
}

impl AllocationIssue {
    pub fn describe(&self, catalog: &Catalog) -> String {
        let name = |id: &str| catalog.node(id).map_or(id.to_string(), |n| n.name.clone());
        match self {
            AllocationIssue::UnknownSkill { id } => format!("Unknown skill ID: {}", id),
            AllocationIssue::OverMax { id, points, max } => {
                format!("{} has {} points but max is {}", name(id), points, max)
            }
            AllocationIssue::Locked { id, points } => {
                format!("{} is locked but has {} points allocated", name(id), points)
            }
        }
    }
}

/// Audit a whole allocation (e.g. one loaded from a link). A funded node is
/// judged locked if it would be locked with its own points removed.
pub fn validate_allocation(allocation: &Allocation, catalog: &Catalog) -> Vec<AllocationIssue> {
    let mut issues = Vec::new();
    for (id, points) in allocation.iter() {
        let Some(node) = catalog.node(id) else {
            issues.push(AllocationIssue::UnknownSkill { id: id.to_string() });
            continue;
        };

        if points > node.max_points() {
            issues.push(AllocationIssue::OverMax {
                id: id.to_string(),
                points,
                max: node.max_points(),
            });
        }

        let mut without = allocation.clone();
        without.set(id, 0);
        if skill_state(node, &without, catalog) == SkillState::Locked {
            issues.push(AllocationIssue::Locked {
                id: id.to_string(),
                points,
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{all, any_of, test_node};

    fn alloc(entries: &[(&str, u32)]) -> Allocation {
        entries.iter().map(|&(id, p)| (id.to_string(), p)).collect()
    }

    /// root → y (max 3) → x (gate 3) → z (gate 0, chained behind x) → w (gate 5)
    fn gated_tree() -> Catalog {
        Catalog::from_nodes(
            vec![
                test_node("root", TreeId::A, 0, all(&[]), 1, 0),
                test_node("y", TreeId::A, 1, all(&["root"]), 3, 0),
                test_node("x", TreeId::A, 2, all(&["y"]), 1, 3),
                test_node("z", TreeId::A, 3, all(&["x"]), 3, 0),
                test_node("w", TreeId::A, 4, all(&["z"]), 1, 5),
                test_node("other-root", TreeId::B, 0, all(&[]), 5, 0),
            ],
            20,
        )
    }

    /// Two roots feeding an OR node.
    fn or_tree() -> Catalog {
        Catalog::from_nodes(
            vec![
                test_node("a", TreeId::C, 0, all(&[]), 1, 0),
                test_node("b", TreeId::C, 0, all(&[]), 1, 0),
                test_node("z", TreeId::C, 1, any_of(&[&["a"], &["b"]]), 1, 0),
                test_node("and", TreeId::C, 1, all(&["a", "b"]), 1, 0),
            ],
            20,
        )
    }

    #[test]
    fn tree_sums_saturate() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", u32::MAX), ("y", u32::MAX), ("other-root", 1)]);
        assert_eq!(tree_points(TreeId::A, &allocation, &catalog), u32::MAX);
        assert_eq!(points_before_gate(TreeId::A, 3, &allocation, &catalog), u32::MAX);
        assert_eq!(tree_points(TreeId::B, &allocation, &catalog), 1);
    }

    #[test]
    fn funded_node_is_unlocked_even_without_prereqs() {
        let catalog = gated_tree();
        let node = catalog.node("w").unwrap();
        let state = skill_state(node, &alloc(&[("w", 1)]), &catalog);
        assert_eq!(state, SkillState::Unlocked);
    }

    #[test]
    fn tier_zero_ignores_nonsense_prereqs_and_gates() {
        let catalog = Catalog::from_nodes(
            vec![test_node("odd-root", TreeId::D, 0, all(&["ghost"]), 1, 99)],
            10,
        );
        let node = catalog.node("odd-root").unwrap();
        assert_eq!(skill_state(node, &Allocation::new(), &catalog), SkillState::Available);
        assert_eq!(skill_state(node, &alloc(&[("odd-root", 1)]), &catalog), SkillState::Unlocked);
    }

    #[test]
    fn and_prereqs_need_every_id() {
        let catalog = or_tree();
        let node = catalog.node("and").unwrap();
        assert_eq!(skill_state(node, &alloc(&[("a", 1)]), &catalog), SkillState::Locked);
        assert_eq!(skill_state(node, &alloc(&[("a", 1), ("b", 1)]), &catalog), SkillState::Available);
    }

    #[test]
    fn or_prereqs_need_one_group() {
        let catalog = or_tree();
        let node = catalog.node("z").unwrap();
        assert_eq!(skill_state(node, &Allocation::new(), &catalog), SkillState::Locked);
        assert_eq!(skill_state(node, &alloc(&[("b", 1)]), &catalog), SkillState::Available);
    }

    #[test]
    fn unknown_prereq_is_unsatisfied() {
        let catalog = Catalog::from_nodes(
            vec![
                test_node("r", TreeId::A, 0, all(&[]), 1, 0),
                test_node("n", TreeId::A, 1, all(&["ghost"]), 1, 0),
            ],
            10,
        );
        let node = catalog.node("n").unwrap();
        let allocation = alloc(&[("r", 1), ("ghost", 1)]);
        assert_eq!(skill_state(node, &allocation, &catalog), SkillState::Locked);
    }

    #[test]
    fn gate_locks_until_threshold_reached() {
        let catalog = gated_tree();
        let x = catalog.node("x").unwrap();
        assert_eq!(skill_state(x, &alloc(&[("root", 1), ("y", 1)]), &catalog), SkillState::Locked);
        assert_eq!(skill_state(x, &alloc(&[("root", 1), ("y", 2)]), &catalog), SkillState::Available);
    }

    #[test]
    fn gate_ignores_points_in_other_trees() {
        let catalog = gated_tree();
        let x = catalog.node("x").unwrap();
        let allocation = alloc(&[("root", 1), ("y", 1), ("other-root", 5)]);
        assert_eq!(skill_state(x, &allocation, &catalog), SkillState::Locked);
    }

    #[test]
    fn points_behind_a_gate_do_not_count_toward_it() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1), ("z", 3)]);
        // z is tagged gate 0 but sits behind x (gate 3).
        assert_eq!(points_before_gate(TreeId::A, 3, &allocation, &catalog), 3);
        // Everything below gate 5 counts toward it.
        assert_eq!(points_before_gate(TreeId::A, 5, &allocation, &catalog), 7);
    }

    #[test]
    fn later_gate_opens_with_chained_points() {
        let catalog = gated_tree();
        let w = catalog.node("w").unwrap();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1), ("z", 1)]);
        assert_eq!(skill_state(w, &allocation, &catalog), SkillState::Available);
        let short = alloc(&[("root", 1), ("y", 2), ("x", 1)]);
        assert_eq!(skill_state(w, &short, &catalog), SkillState::Locked);
    }

    #[test]
    fn prerequisite_cycles_terminate() {
        let catalog = Catalog::from_nodes(
            vec![
                test_node("p", TreeId::B, 1, all(&["q"]), 1, 0),
                test_node("q", TreeId::B, 1, all(&["p"]), 1, 0),
                test_node("g", TreeId::B, 2, all(&[]), 1, 2),
            ],
            10,
        );
        let allocation = alloc(&[("p", 1), ("q", 1)]);
        assert_eq!(points_before_gate(TreeId::B, 2, &allocation, &catalog), 2);
    }

    #[test]
    fn can_add_respects_max_and_state() {
        let catalog = gated_tree();
        let y = catalog.node("y").unwrap();
        assert!(!can_add_point(y, &Allocation::new(), &catalog));
        assert!(can_add_point(y, &alloc(&[("root", 1)]), &catalog));
        assert!(can_add_point(y, &alloc(&[("root", 1), ("y", 2)]), &catalog));
        assert!(!can_add_point(y, &alloc(&[("root", 1), ("y", 3)]), &catalog));
    }

    #[test]
    fn top_up_skips_prereq_check() {
        let catalog = gated_tree();
        let y = catalog.node("y").unwrap();
        // Funded but root is gone: still allowed to top up.
        assert!(can_add_point(y, &alloc(&[("y", 1)]), &catalog));
    }

    #[test]
    fn cannot_remove_unfunded_or_unknown() {
        let catalog = gated_tree();
        assert!(!can_remove_point("y", &Allocation::new(), &catalog));
        assert!(!can_remove_point("ghost", &alloc(&[("ghost", 1)]), &catalog));
    }

    #[test]
    fn removal_blocked_when_gate_would_drop() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1)]);
        assert!(!can_remove_point("y", &allocation, &catalog));
        assert!(!can_remove_point("root", &allocation, &catalog));
        // x itself is a leaf.
        assert!(can_remove_point("x", &allocation, &catalog));
    }

    #[test]
    fn removal_blocked_even_when_points_exist_behind_the_gate() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1), ("z", 3)]);
        assert!(!can_remove_point("y", &allocation, &catalog));
    }

    #[test]
    fn partial_removal_allowed_with_surplus() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 3), ("x", 1)]);
        assert!(can_remove_point("y", &allocation, &catalog));
    }

    #[test]
    fn removal_blocked_by_and_dependent() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 1)]);
        assert!(!can_remove_point("root", &allocation, &catalog));
        assert!(can_remove_point("y", &allocation, &catalog));
    }

    #[test]
    fn or_dependent_allows_removing_one_branch() {
        let catalog = or_tree();
        let allocation = alloc(&[("a", 1), ("b", 1), ("z", 1)]);
        assert!(can_remove_point("a", &allocation, &catalog));
        assert!(can_remove_point("b", &allocation, &catalog));

        let only_b = alloc(&[("b", 1), ("z", 1)]);
        assert!(!can_remove_point("b", &only_b, &catalog));

        let leaf_gone = alloc(&[("b", 1)]);
        assert!(can_remove_point("b", &leaf_gone, &catalog));
    }

    #[test]
    fn gate_above_own_gate_only() {
        // A node past a gate can be removed freely even though the gate's
        // sum is exactly met.
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1), ("z", 2)]);
        assert!(can_remove_point("z", &allocation, &catalog));
    }

    #[test]
    fn tree_points_ignore_unknown_ids() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("ghost", 4), ("other-root", 3)]);
        assert_eq!(tree_points(TreeId::A, &allocation, &catalog), 3);
        assert_eq!(tree_points(TreeId::B, &allocation, &catalog), 3);
    }

    #[test]
    fn dependents_include_or_groups() {
        let catalog = or_tree();
        let ids: Vec<&str> = dependent_skills("a", &catalog).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "and"]);
        assert!(dependent_skills("z", &catalog).is_empty());
    }

    #[test]
    fn validate_flags_unknown_overmax_and_locked() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 5), ("ghost", 1), ("w", 1)]);
        let issues = validate_allocation(&allocation, &catalog);
        assert!(issues.contains(&AllocationIssue::UnknownSkill { id: "ghost".into() }));
        assert!(issues.contains(&AllocationIssue::OverMax { id: "y".into(), points: 5, max: 3 }));
        assert!(issues.contains(&AllocationIssue::Locked { id: "w".into(), points: 1 }));
        assert!(!issues.iter().any(|i| matches!(i, AllocationIssue::Locked { id, .. } if id == "y")));
    }

    #[test]
    fn validate_clean_build_has_no_issues() {
        let catalog = gated_tree();
        let allocation = alloc(&[("root", 1), ("y", 2), ("x", 1)]);
        assert!(validate_allocation(&allocation, &catalog).is_empty());
    }

    #[test]
    fn issue_descriptions_use_node_names() {
        let catalog = gated_tree();
        let text = AllocationIssue::OverMax { id: "y".into(), points: 5, max: 3 }.describe(&catalog);
        assert_eq!(text, "y has 5 points but max is 3");
    }
}
