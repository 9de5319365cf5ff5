//! `/api/build/*` routes: share tokens, share links, and raw state export.

use crate::build::codec;
use crate::build::reducer::SkillAction;
use crate::build::render;
use crate::build::state::{self, with_session, with_session_mut};
use crate::util::{escape_html, get_param, parse_form_body, parse_query};

// ── GET /api/build/token ───────────────────────────────────────────

/// Plain-text V3 token for the current allocation (empty when nothing is spent).
pub fn handle_token_get(_query: &str) -> String {
    with_session(|s| codec::encode(s.allocation(), s.catalog()))
}

// ── GET /api/build/share ───────────────────────────────────────────

/// Handle GET /api/build/share?url={page url}
/// Returns the page URL with `v`/`build` set to the current build, or
/// stripped of them when the build is empty.
pub fn handle_share_get(query: &str) -> String {
    let params = parse_query(query);
    let Some(url) = get_param(&params, "url").filter(|u| !u.is_empty()) else {
        return r#"<span class="text-red-600">Missing url parameter</span>"#.to_string();
    };
    let token = handle_token_get("");
    codec::share_url(url, &token)
}

// ── POST /api/build/load ───────────────────────────────────────────

/// Handle POST /api/build/load
/// Body params:
///   - build={token} → decode a bare token
///   - url={page url} → decode the `build` param of a shared link
///
/// The decoded map replaces the allocation wholesale. Undecodable input
/// loads as an empty build. Returns the summary HTML.
pub fn handle_load_post(body: &str) -> String {
    let params = parse_form_body(body);
    let build = get_param(&params, "build");
    let url = get_param(&params, "url");

    let loaded = with_session(|s| match (build, url) {
        (Some(token), _) => Some(codec::decode(token, s.catalog())),
        (None, Some(url)) => Some(codec::decode_page_url(url, s.catalog())),
        (None, None) => None,
    });
    let Some(allocation) = loaded else {
        return r#"<span class="text-red-600">Missing build or url parameter</span>"#.to_string();
    };

    with_session_mut(|s| {
        s.dispatch(SkillAction::LoadState {
            skill_points: allocation.as_record().clone(),
        })
    });
    render::render_summary()
}

// ── GET /api/build/state ───────────────────────────────────────────

/// JSON export of the allocation map, for localStorage persistence.
pub fn handle_state_get(_query: &str) -> String {
    state::export_allocation_json()
}

// ── POST /api/build/state ──────────────────────────────────────────

/// Restore an allocation map previously exported by GET /api/build/state.
/// Accepts `state={json}` form data or the raw JSON body.
pub fn handle_state_post(body: &str) -> String {
    let params = parse_form_body(body);
    let json = get_param(&params, "state").unwrap_or(body.trim());
    match state::import_allocation_json(json) {
        Ok(()) => r#"<span class="text-emerald-600">Build restored</span>"#.to_string(),
        Err(e) => format!(
            r#"<span class="text-red-600">Import failed: {}</span>"#,
            escape_html(&e.to_string())
        ),
    }
}
