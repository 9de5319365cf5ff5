//! Skill-tree build planner, served in-browser from WASM.
//!
//! Exports `handle_request(method, path, query, body)` for the Service Worker
//! bridge to call. Uses `matchit` for URL routing, the same router
//! engine that powers Axum.
//!
//! `/api/skills/*` evaluates and edits the allocation, `/api/build/*` handles
//! share tokens and persistence, `/api/config/*` switches catalogs and
//! applies editor overrides. All state is per-worker (thread_local).

use wasm_bindgen::prelude::*;

pub mod build;
pub mod catalog;
pub mod error;
pub mod routes;
pub mod util;

pub use error::{Error, Result};

/// Process an HTTP-like request and return an HTML fragment (or JSON / plain
/// text for the data routes).
///
/// Called from JavaScript (Web Worker) via wasm-bindgen.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "GET", "POST")
/// * `path`   - URL path (e.g., "/api/skills/node")
/// * `query`  - Query string (e.g., "?id=tree-a-node-0")
/// * `body`   - Request body (e.g., POST form data). Empty string for GET requests.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    // Build the router. matchit compiles route patterns into a radix tree.
    let mut router = matchit::Router::new();

    // Register routes; the value is a &str tag we match on below
    router.insert("/api/skills/node", "skills_node").ok();
    router.insert("/api/skills/states", "skills_states").ok();
    router.insert("/api/skills/summary", "skills_summary").ok();
    router.insert("/api/skills/points", "skills_points").ok();
    router.insert("/api/skills/dispatch", "skills_dispatch").ok();
    router.insert("/api/skills/validate", "skills_validate").ok();
    router.insert("/api/skills/dependents", "skills_dependents").ok();

    router.insert("/api/build/token", "build_token").ok();
    router.insert("/api/build/share", "build_share").ok();
    router.insert("/api/build/load", "build_load").ok();
    router.insert("/api/build/state", "build_state").ok();

    router.insert("/api/config", "config").ok();
    router.insert("/api/config/mode", "config_mode").ok();
    router.insert("/api/config/max", "config_max").ok();
    router.insert("/api/config/overrides", "config_overrides").ok();

    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            ("skills_node", "GET") => routes::skills::handle_node_get(query),
            ("skills_states", "GET") => routes::skills::handle_states_get(query),
            ("skills_summary", "GET") => routes::skills::handle_summary_get(query),
            ("skills_points", "POST") => routes::skills::handle_points_post(body),
            ("skills_dispatch", "POST") => routes::skills::handle_dispatch_post(body),
            ("skills_validate", "GET") => routes::skills::handle_validate_get(query),
            ("skills_dependents", "GET") => routes::skills::handle_dependents_get(query),

            ("build_token", "GET") => routes::build::handle_token_get(query),
            ("build_share", "GET") => routes::build::handle_share_get(query),
            ("build_load", "POST") => routes::build::handle_load_post(body),
            ("build_state", "GET") => routes::build::handle_state_get(query),
            ("build_state", "POST") => routes::build::handle_state_post(body),

            ("config", "GET") => routes::config::handle_config_get(query),
            ("config_mode", "POST") => routes::config::handle_mode_post(body),
            ("config_max", "POST") => routes::config::handle_max_post(body),
            ("config_overrides", "POST") => routes::config::handle_overrides_post(body),

            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    r#"<span class="text-red-600">404 — route not found</span>"#.to_string()
}

fn method_not_allowed() -> String {
    r#"<span class="text-red-600">405 — method not allowed</span>"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::state::{BuildSession, replace_session, with_session};

    fn reset_state() {
        replace_session(BuildSession::default());
    }

    #[test]
    fn returns_404_for_unknown_route() {
        let html = handle_request("GET", "/api/nonexistent", "", "");
        assert!(html.contains("404"));
        assert!(html.contains(r#"class="text-red-600""#));
    }

    #[test]
    fn returns_405_for_wrong_method() {
        let html = handle_request("POST", "/api/skills/node", "", "");
        assert!(html.contains("405"));
        let html = handle_request("GET", "/api/skills/points", "", "");
        assert!(html.contains("405"));
    }

    #[test]
    fn routes_node_panel() {
        reset_state();
        let html = handle_request("GET", "/api/skills/node", "?id=tree-c-node-0", "");
        assert!(html.contains("Veil"));
    }

    #[test]
    fn climb_to_gated_node_and_share() {
        reset_state();
        // Tree D: root, one point in each tier-1 node gives 3 points, opening the gate of 3.
        for id in ["tree-d-node-0", "tree-d-node-1", "tree-d-node-2"] {
            handle_request("POST", "/api/skills/points", "", &format!("action=add&id={}", id));
        }
        let states = handle_request("GET", "/api/skills/states", "?tree=D", "");
        let value: serde_json::Value = serde_json::from_str(&states).unwrap();
        assert_eq!(value["tree-d-node-3"]["state"], "available");
        assert_eq!(value["tree-d-node-4"]["state"], "locked");

        handle_request("POST", "/api/skills/points", "", "action=add&id=tree-d-node-3");
        // Removing a tier-1 point would drop the tree below the gate of d3.
        handle_request("POST", "/api/skills/points", "", "action=remove&id=tree-d-node-1");
        with_session(|s| assert_eq!(s.points("tree-d-node-1"), 1));

        let token = handle_request("GET", "/api/build/token", "", "");
        assert!(token.starts_with('3'));

        reset_state();
        let html = handle_request("POST", "/api/build/load", "", &format!("build={}", token));
        assert!(html.contains("Wilds: 4"));
        assert!(handle_request("GET", "/api/skills/validate", "", "").contains("Build is valid"));
        reset_state();
    }

    #[test]
    fn routes_config_and_mode_switch() {
        reset_state();
        let json = handle_request("GET", "/api/config", "", "");
        assert!(json.contains("\"mode\":\"main\""));

        let html = handle_request("POST", "/api/config/mode", "", "mode=proto");
        assert!(html.contains("0/40"));
        let json = handle_request("GET", "/api/config", "", "");
        assert!(json.contains("\"mode\":\"proto\""));
        reset_state();
    }

    #[test]
    fn routes_state_roundtrip() {
        reset_state();
        handle_request("POST", "/api/skills/dispatch", "", r#"{"type":"SET_POINTS","skillId":"tree-a-node-2","points":2}"#);
        let json = handle_request("GET", "/api/build/state", "", "");
        reset_state();
        let html = handle_request("POST", "/api/build/state", "", &json);
        assert!(html.contains("Build restored"));
        with_session(|s| assert_eq!(s.points("tree-a-node-2"), 2));
        reset_state();
    }
}
