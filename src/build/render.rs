//! HTML fragments for the planner UI (HTMX swaps).
//!
//! Everything is rendered from the live session on each call; nothing is
//! cached between requests.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::build::logic::{self, SkillState};
use crate::build::state::{BuildSession, with_session};
use crate::catalog::{SkillNode, TreeId};
use crate::util::escape_html;

/// Per-node snapshot for the tree renderer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub state: SkillState,
    pub points: u32,
    pub max_points: u32,
    pub can_add: bool,
    pub can_remove: bool,
}

/// Snapshot every node (optionally one tree) of the session.
pub fn node_views(session: &BuildSession, tree: Option<TreeId>) -> BTreeMap<String, NodeView> {
    let catalog = session.catalog();
    let allocation = session.allocation();
    let at_max = session.is_at_max_points();
    let nodes: Box<dyn Iterator<Item = &SkillNode> + '_> = match tree {
        Some(tree) => Box::new(catalog.tree_nodes(tree)),
        None => Box::new(catalog.nodes().iter()),
    };
    nodes
        .map(|node| {
            let view = NodeView {
                state: logic::skill_state(node, allocation, catalog),
                points: allocation.points(&node.id),
                max_points: node.max_points(),
                can_add: !at_max && logic::can_add_point(node, allocation, catalog),
                can_remove: logic::can_remove_point(&node.id, allocation, catalog),
            };
            (node.id.clone(), view)
        })
        .collect()
}

/// JSON map id → node view.
pub fn render_states_json(tree: Option<TreeId>) -> String {
    with_session(|s| {
        serde_json::to_string(&node_views(s, tree)).unwrap_or_else(|_| "{}".to_string())
    })
}

fn state_classes(state: SkillState) -> (&'static str, &'static str) {
    match state {
        SkillState::Unlocked => ("bg-amber-100 border-amber-500", "Unlocked"),
        SkillState::Available => ("bg-emerald-50 border-emerald-600", "Available"),
        SkillState::Locked => ("bg-slate-100 border-slate-400 opacity-70", "Locked"),
    }
}

/// Node detail panel: points, state, add/remove buttons.
pub fn render_node_panel(id: &str) -> String {
    with_session(|session| {
        let Some(node) = session.catalog().node(id) else {
            return format!(
                r#"<span class="text-red-600">Unknown skill: {}</span>"#,
                escape_html(id)
            );
        };
        let views = node_views(session, Some(node.tree));
        let Some(view) = views.get(id) else {
            return String::new();
        };
        let (classes, label) = state_classes(view.state);
        let eid = escape_html(&node.id);

        let mut html = String::with_capacity(1024);
        html.push_str(&format!(
            r#"<div id="skill-panel" class="p-3 rounded-lg border {}" data-skill="{}">"#,
            classes, eid
        ));
        html.push_str(&format!(
            r#"<p class="font-bold">{}</p>"#,
            escape_html(&node.name)
        ));
        if !node.description.is_empty() {
            html.push_str(&format!(
                r#"<p class="text-sm">{}</p>"#,
                escape_html(&node.description)
            ));
        }
        html.push_str(&format!(
            r#"<p class="text-xs">{} · <span class="font-mono">{}/{}</span></p>"#,
            label, view.points, view.max_points
        ));

        let gate = node.gate();
        if gate > 0 && view.state == SkillState::Locked {
            let have = logic::points_before_gate(node.tree, gate, session.allocation(), session.catalog());
            html.push_str(&format!(
                r#"<p class="text-xs text-red-600">Requires {} points in tree ({} spent)</p>"#,
                gate, have
            ));
        }
        if let Some(comment) = &node.comment {
            html.push_str(&format!(
                r#"<p class="text-xs italic">{}</p>"#,
                escape_html(comment)
            ));
        }

        html.push_str(r#"<div class="flex gap-2 mt-2">"#);
        html.push_str(&point_button(&eid, "remove", "−", view.can_remove));
        html.push_str(&point_button(&eid, "add", "+", view.can_add));
        html.push_str("</div></div>");
        html
    })
}

fn point_button(eid: &str, action: &str, glyph: &str, enabled: bool) -> String {
    let disabled = if enabled { "" } else { " disabled" };
    format!(
        r##"<button class="w-8 h-8 rounded-full border font-bold disabled:opacity-40" hx-post="/api/skills/points" hx-vals='{{"action":"{}","id":"{}"}}' hx-target="#skill-summary"{}>{}</button>"##,
        action, eid, disabled, glyph
    )
}

/// Toolbar summary: total spent, per-tree totals, at-max banner.
pub fn render_summary() -> String {
    with_session(|session| {
        let mut html = String::with_capacity(1024);
        html.push_str(r#"<div id="skill-summary" class="flex flex-col gap-1">"#);
        html.push_str(&format!(
            r#"<p class="font-bold">Points: <span class="font-mono">{}/{}</span></p>"#,
            session.total_points(),
            session.max_skill_points()
        ));
        html.push_str(r#"<ul class="text-sm">"#);
        for tree in session.catalog().visible_trees() {
            let name = session
                .catalog()
                .tree_settings(tree)
                .map_or(tree.as_str().to_string(), |t| t.name.clone());
            html.push_str(&format!(
                r#"<li data-tree="{}">{}: {}</li>"#,
                tree,
                escape_html(&name),
                session.tree_points(tree)
            ));
        }
        html.push_str("</ul>");
        if session.is_at_max_points() {
            html.push_str(r#"<p class="text-red-600 font-bold">All skill points spent</p>"#);
        }
        html.push_str("</div>");
        html
    })
}

/// Allocation audit as a list; empty build or clean build gets a note.
pub fn render_validation() -> String {
    with_session(|session| {
        let issues = logic::validate_allocation(session.allocation(), session.catalog());
        if issues.is_empty() {
            return r#"<span class="text-emerald-600">Build is valid</span>"#.to_string();
        }
        let mut html = String::from(r#"<ul class="text-red-600 text-sm">"#);
        for issue in &issues {
            html.push_str(&format!(
                "<li>{}</li>",
                escape_html(&issue.describe(session.catalog()))
            ));
        }
        html.push_str("</ul>");
        html
    })
}

/// Nodes that list `id` among their prerequisites.
pub fn render_dependents(id: &str) -> String {
    with_session(|session| {
        let dependents = logic::dependent_skills(id, session.catalog());
        if dependents.is_empty() {
            return r#"<span class="text-slate-500">Nothing depends on this skill</span>"#.to_string();
        }
        let mut html = String::from(r#"<ul class="text-sm">"#);
        for node in dependents {
            html.push_str(&format!(
                r#"<li data-skill="{}">{}</li>"#,
                escape_html(&node.id),
                escape_html(&node.name)
            ));
        }
        html.push_str("</ul>");
        html
    })
}
