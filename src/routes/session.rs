//! Session, config and notice routes.

use serde_json::json;
use tracing::{debug, info};

use crate::config::{import_config_json, with_config};
use crate::grid::notice;
use crate::grid::persist::with_queue_mut;
use crate::grid::reorder::with_controller_mut;
use crate::grid::session::{
    replace_session, user_id_from_token, with_session, InteractionMode, Session, SessionKind,
};
use crate::grid::view::with_projector_mut;
use crate::routes::util::{get_nonempty, get_param, parse_form_body};

fn session_json(session: &Session) -> String {
    let (kind, user_id, share_id, share_mode, persistent) = match &session.kind {
        SessionKind::Local => ("local", None, None, None, false),
        SessionKind::Account { user_id } => ("account", Some(user_id.as_str()), None, None, false),
        SessionKind::Shared {
            share_id,
            mode,
            persistent,
        } => ("shared", None, Some(share_id.as_str()), Some(*mode), *persistent),
    };
    json!({
        "kind": kind,
        "user_id": user_id,
        "share_id": share_id,
        "share_mode": share_mode,
        "persistent": persistent,
        "can_edit": session.can_edit(),
        "delete_mode": session.mode == InteractionMode::Delete,
    })
    .to_string()
}

// ── GET /api/session ───────────────────────────────────────────────

/// Handle GET /api/session
pub fn handle_session_get(_query: &str) -> String {
    with_session(session_json)
}

// ── POST /api/session ──────────────────────────────────────────────

/// Handle POST /api/session
/// Body params:
///   - action=login&token={jwt} → switch to the account behind the token
///   - action=logout            → back to the anonymous local grid
/// The caller restores the matching grid document afterwards.
pub fn handle_session_post(body: &str) -> String {
    let params = parse_form_body(body);
    let next = match get_param(&params, "action") {
        Some("login") => {
            let Some(token) = get_nonempty(&params, "token") else {
                return "error: missing token".to_string();
            };
            let Some(user_id) = user_id_from_token(token) else {
                return "error: token carries no user id".to_string();
            };
            info!(user_id = %user_id, "Logged in");
            Session {
                kind: SessionKind::Account { user_id },
                token: Some(token.to_string()),
                ..Session::default()
            }
        }
        Some("logout") => {
            info!("Logged out");
            Session::default()
        }
        _ => return "error: unknown session action".to_string(),
    };
    replace_session(next);
    // Outstanding acks belong to the previous owner's grid.
    if let Some(seq) = with_queue_mut(|q| q.rebase()) {
        debug!(seq, "Pending save left to the previous session");
    }
    with_controller_mut(|c| c.set_enabled(true));
    with_projector_mut(|p| p.clear());
    with_session(session_json)
}

// ── POST /api/config ───────────────────────────────────────────────

/// Handle POST /api/config
/// Body is a JSON config document; missing keys keep their defaults.
pub fn handle_config_post(body: &str) -> String {
    match import_config_json(body.trim()) {
        Ok(()) => {
            let (threshold, long_press) =
                with_config(|c| (c.drag_threshold_px, c.long_press_ms));
            with_controller_mut(|c| c.set_timing(threshold, long_press));
            "ok".to_string()
        }
        Err(e) => format!("error: {}", e),
    }
}

// ── GET /api/notices ───────────────────────────────────────────────

/// Handle GET /api/notices
/// Drains the notice queue as `role="alert"` elements.
pub fn handle_notices_get(_query: &str) -> String {
    notice::render_drain()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{replace_config, GridConfig};
    use crate::grid::catalog::{fixtures, replace_catalog};
    use crate::grid::notice::NoticeKind;
    use crate::grid::persist::reset_queue;
    use crate::grid::session::{reset_session, token_for};
    use crate::grid::state::{replace_state, GridState};
    use crate::routes::grid::{handle_ack_post, handle_add_post};

    #[test]
    fn login_and_logout() {
        reset_session();
        let token = token_for(r#"{"sub":"u-7"}"#);
        let out = handle_session_post(&format!("action=login&token={}", token));
        assert!(out.contains(r#""kind":"account""#));
        assert!(out.contains(r#""user_id":"u-7""#));
        with_session(|s| assert_eq!(s.token.as_deref(), Some(token.as_str())));

        let out = handle_session_post("action=logout");
        assert!(out.contains(r#""kind":"local""#));
        reset_session();
    }

    #[test]
    fn login_keeps_save_numbering() {
        replace_catalog(fixtures::catalog());
        replace_state(GridState::default());
        reset_session();
        reset_queue();
        notice::clear();

        // Local save #1 is still in flight when the user logs in.
        assert!(handle_add_post("id=a").contains("seq:1"));
        let token = token_for(r#"{"sub":"u-7"}"#);
        handle_session_post(&format!("action=login&token={}", token));
        let html = handle_add_post("id=b");
        assert!(html.contains("seq:2"));
        assert!(html.contains("/api/save"));

        // The late local failure must not be blamed on the profile save.
        assert_eq!(handle_ack_post("seq=1&error=QuotaExceeded"), "");
        let html = handle_ack_post("seq=2&error=HTTP+500");
        assert!(html.contains("saving to profile:u-7 failed: HTTP 500"));

        replace_state(GridState::default());
        reset_session();
        reset_queue();
        notice::clear();
    }

    #[test]
    fn login_rejects_opaque_token() {
        reset_session();
        assert!(handle_session_post("action=login&token=abc").starts_with("error:"));
        assert!(handle_session_post("action=dance").starts_with("error:"));
        with_session(|s| assert_eq!(s.kind, SessionKind::Local));
    }

    #[test]
    fn session_reports_edit_rights() {
        reset_session();
        let out = handle_session_get("");
        assert!(out.contains(r#""can_edit":true"#));
        assert!(out.contains(r#""delete_mode":false"#));
    }

    #[test]
    fn config_updates_controller_timing() {
        assert_eq!(handle_config_post(r#"{"long_press_ms": 800}"#), "ok");
        with_config(|c| assert_eq!(c.long_press_ms, 800.0));
        assert!(handle_config_post("{{{").starts_with("error:"));
        replace_config(GridConfig::default());
    }

    #[test]
    fn notices_drain() {
        notice::clear();
        notice::push(NoticeKind::Info, "hello");
        assert!(handle_notices_get("").contains("hello"));
        assert!(handle_notices_get("").is_empty());
    }
}
