//! `/api/config/*` routes: catalog metadata, mode switching, point budget,
//! and tree-editor overrides.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::build::render;
use crate::build::state::{with_session, with_session_mut};
use crate::catalog::{Catalog, CatalogOverrides, ConfigMode, SkillPath, TreeId, TreeSettings};
use crate::util::{escape_html, get_param, parse_form_body, parse_query};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView<'a> {
    version: &'a str,
    mode: ConfigMode,
    max_skill_points: u32,
    trees: &'a BTreeMap<TreeId, TreeSettings>,
    /// Connector edges per tree, for drawing the tree.
    paths: BTreeMap<TreeId, Vec<&'a SkillPath>>,
}

fn config_json(catalog: &Catalog, mode: ConfigMode, max_skill_points: u32) -> String {
    let view = ConfigView {
        version: catalog.version(),
        mode,
        max_skill_points,
        trees: catalog.trees(),
        paths: TreeId::ALL
            .iter()
            .map(|&tree| (tree, catalog.tree_paths(tree).collect()))
            .collect(),
    };
    serde_json::to_string(&view).unwrap_or_else(|_| "{}".to_string())
}

fn json_error(message: String) -> String {
    serde_json::json!({ "error": message }).to_string()
}

// ── GET /api/config ────────────────────────────────────────────────

/// Handle GET /api/config[?mode=main|proto]
/// Without a mode (or with the session's own mode) the live catalog is
/// described, overrides and budget included; another mode is read from
/// its embedded catalog without touching the session.
pub fn handle_config_get(query: &str) -> String {
    let params = parse_query(query);
    let requested = match get_param(&params, "mode").filter(|m| !m.is_empty()) {
        Some(m) => match ConfigMode::parse(m) {
            Ok(mode) => Some(mode),
            Err(e) => return json_error(e.to_string()),
        },
        None => None,
    };

    with_session(|s| match requested {
        Some(mode) if mode != s.mode() => match Catalog::embedded(mode) {
            Ok(catalog) => config_json(&catalog, mode, catalog.max_skill_points()),
            Err(e) => {
                tracing::warn!("Failed to load {} catalog: {}", mode.as_str(), e);
                json_error(e.to_string())
            }
        },
        _ => config_json(s.catalog(), s.mode(), s.max_skill_points()),
    })
}

// ── POST /api/config/mode ──────────────────────────────────────────

/// Handle POST /api/config/mode with `mode=main|proto`.
/// Switching drops the allocation and reloads the budget; re-posting the
/// current mode is a no-op. Returns the summary HTML.
pub fn handle_mode_post(body: &str) -> String {
    let params = parse_form_body(body);
    let raw = get_param(&params, "mode").unwrap_or("");
    let mode = match ConfigMode::parse(raw) {
        Ok(mode) => mode,
        Err(e) => {
            return format!(
                r#"<span class="text-red-600">{}</span>"#,
                escape_html(&e.to_string())
            );
        }
    };
    with_session_mut(|s| {
        if s.mode() != mode {
            s.switch_mode(mode);
        }
    });
    render::render_summary()
}

// ── POST /api/config/max ───────────────────────────────────────────

/// Handle POST /api/config/max with `max={n}`; values below 1 become 1.
pub fn handle_max_post(body: &str) -> String {
    let params = parse_form_body(body);
    let Some(max) = get_param(&params, "max").and_then(|m| m.trim().parse::<u32>().ok()) else {
        return r#"<span class="text-red-600">Missing or invalid max parameter</span>"#.to_string();
    };
    with_session_mut(|s| s.set_max_skill_points(max));
    render::render_summary()
}

// ── POST /api/config/overrides ─────────────────────────────────────

/// Handle POST /api/config/overrides with a JSON body
/// `{"trees": {...}, "nodeOverrides": {...}}`. Returns the config JSON.
pub fn handle_overrides_post(body: &str) -> String {
    let overrides: CatalogOverrides = match serde_json::from_str(body.trim()) {
        Ok(o) => o,
        Err(e) => return json_error(format!("Invalid overrides: {}", e)),
    };
    with_session_mut(|s| s.apply_overrides(&overrides));
    handle_config_get("")
}
