//! `/api/skills/*` routes: node panels, live node states, point allocation.

use crate::build::reducer::SkillAction;
use crate::build::render;
use crate::build::state::with_session_mut;
use crate::catalog::TreeId;
use crate::util::{escape_html, get_param, parse_form_body, parse_query};

fn missing_id() -> String {
    r#"<span class="text-red-600">Missing id parameter</span>"#.to_string()
}

// ── GET /api/skills/node ───────────────────────────────────────────

/// Handle GET /api/skills/node?id={skill}
pub fn handle_node_get(query: &str) -> String {
    let params = parse_query(query);
    match get_param(&params, "id") {
        Some(id) if !id.is_empty() => render::render_node_panel(id),
        _ => missing_id(),
    }
}

// ── GET /api/skills/states ─────────────────────────────────────────

/// Handle GET /api/skills/states[?tree=A]
/// JSON map of every node's state, recomputed from the current allocation.
pub fn handle_states_get(query: &str) -> String {
    let params = parse_query(query);
    let tree = match get_param(&params, "tree") {
        Some(t) if !t.is_empty() => match TreeId::parse(t) {
            Some(tree) => Some(tree),
            None => {
                return serde_json::json!({ "error": format!("Unknown tree {}", t) }).to_string();
            }
        },
        _ => None,
    };
    render::render_states_json(tree)
}

// ── GET /api/skills/summary ────────────────────────────────────────

pub fn handle_summary_get(_query: &str) -> String {
    render::render_summary()
}

// ── POST /api/skills/points ────────────────────────────────────────

/// Handle POST /api/skills/points
/// Body params:
///   - action=add&id={skill}            → add one point
///   - action=remove&id={skill}         → remove one point
///   - action=set&id={skill}&points={n} → set points (clamped, no rule checks)
///   - action=unlock|lock&id={skill}    → set to 1 / 0
///   - action=reset                     → clear the whole build
///
/// Returns the summary HTML.
pub fn handle_points_post(body: &str) -> String {
    let params = parse_form_body(body);
    let action = get_param(&params, "action").unwrap_or("");
    let id = get_param(&params, "id").unwrap_or("").to_string();

    let action = match action {
        "reset" => SkillAction::ResetAll,
        _ if id.is_empty() => return missing_id(),
        "add" => SkillAction::AddPoint { skill_id: id },
        "remove" => SkillAction::RemovePoint { skill_id: id },
        "unlock" => SkillAction::Unlock { skill_id: id },
        "lock" => SkillAction::Lock { skill_id: id },
        "set" => {
            let Some(points) = get_param(&params, "points").and_then(|p| p.trim().parse::<i64>().ok())
            else {
                return r#"<span class="text-red-600">Missing or invalid points parameter</span>"#
                    .to_string();
            };
            SkillAction::SetPoints { skill_id: id, points }
        }
        other => {
            return format!(
                r#"<span class="text-red-600">Unknown action: {}</span>"#,
                escape_html(other)
            );
        }
    };

    with_session_mut(|s| s.dispatch(action));
    render::render_summary()
}

// ── POST /api/skills/dispatch ──────────────────────────────────────

/// Handle POST /api/skills/dispatch with a JSON reducer action body, e.g.
/// `{"type":"ADD_POINT","skillId":"tree-a-node-0"}`.
pub fn handle_dispatch_post(body: &str) -> String {
    match serde_json::from_str::<SkillAction>(body.trim()) {
        Ok(action) => {
            with_session_mut(|s| s.dispatch(action));
            render::render_summary()
        }
        Err(e) => format!(
            r#"<span class="text-red-600">Invalid action: {}</span>"#,
            escape_html(&e.to_string())
        ),
    }
}

// ── GET /api/skills/validate ───────────────────────────────────────

pub fn handle_validate_get(_query: &str) -> String {
    render::render_validation()
}

// ── GET /api/skills/dependents ─────────────────────────────────────

/// Handle GET /api/skills/dependents?id={skill}
pub fn handle_dependents_get(query: &str) -> String {
    let params = parse_query(query);
    match get_param(&params, "id") {
        Some(id) if !id.is_empty() => render::render_dependents(id),
        _ => missing_id(),
    }
}
