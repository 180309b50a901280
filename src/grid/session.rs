//! Session context: who owns the grid being edited and what clicks do.
//!
//! The session decides where saves go (localStorage, the user's profile, or
//! a shared snapshot), whether mutators are allowed at all, and which of the
//! two click behaviours is active.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use tracing::info;

use crate::error::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    ReadOnly,
    ReadWrite,
}

impl ShareMode {
    /// `?edit=true` links are editable, anything else is read-only.
    pub fn from_edit_flag(edit: &str) -> Self {
        if edit == "true" {
            ShareMode::ReadWrite
        } else {
            ShareMode::ReadOnly
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "readonly" => Some(ShareMode::ReadOnly),
            "readwrite" => Some(ShareMode::ReadWrite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    /// Anonymous visitor; the grid lives in localStorage.
    Local,
    /// Logged-in user; the grid is their server profile.
    Account { user_id: String },
    /// Someone else's grid opened from a share link.
    Shared {
        share_id: String,
        mode: ShareMode,
        /// Persistent links track the owner's live grid; snapshots are copies.
        persistent: bool,
    },
}

/// What a click on a cell does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InteractionMode {
    #[default]
    Normal,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    ToggleCheck,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub kind: SessionKind,
    pub mode: InteractionMode,
    /// Raw bearer token, attached to profile saves.
    pub token: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            kind: SessionKind::Local,
            mode: InteractionMode::Normal,
            token: None,
        }
    }
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        matches!(self.kind, SessionKind::Account { .. })
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, SessionKind::Shared { .. })
    }

    pub fn can_edit(&self) -> bool {
        !matches!(
            self.kind,
            SessionKind::Shared {
                mode: ShareMode::ReadOnly,
                ..
            }
        )
    }

    /// Gate for every mutator.
    pub fn ensure_editable(&self) -> Result<(), GridError> {
        if self.can_edit() {
            Ok(())
        } else {
            Err(GridError::ReadOnlySession)
        }
    }

    /// Flip between normal and delete mode. Returns the new mode.
    pub fn toggle_delete_mode(&mut self) -> InteractionMode {
        self.mode = match self.mode {
            InteractionMode::Normal => InteractionMode::Delete,
            InteractionMode::Delete => InteractionMode::Normal,
        };
        self.mode
    }

    /// The single click handler's dispatch.
    pub fn click_action(&self) -> ClickAction {
        match self.mode {
            InteractionMode::Normal => ClickAction::ToggleCheck,
            InteractionMode::Delete => ClickAction::Remove,
        }
    }
}

/// Pull a user id out of a bearer token's payload segment.
///
/// The token is opaque to the grid: the signature is not checked here, the
/// server does that on every save. Prefers `sub`, then `id`, then `email`.
pub fn user_id_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    ["sub", "id", "email"].iter().find_map(|key| match claims.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

thread_local! {
    static SESSION: RefCell<Session> = RefCell::new(Session::default());
}

/// Execute a closure with read access to the session.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&Session) -> R,
{
    SESSION.with(|s| f(&s.borrow()))
}

/// Execute a closure with mutable access to the session.
pub fn with_session_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Session) -> R,
{
    SESSION.with(|s| f(&mut s.borrow_mut()))
}

pub fn replace_session(session: Session) {
    info!(kind = ?session.kind, "Session switched");
    SESSION.with(|s| *s.borrow_mut() = session);
}

pub fn reset_session() {
    SESSION.with(|s| *s.borrow_mut() = Session::default());
}

#[cfg(test)]
pub(crate) fn token_for(claims: &str) -> String {
    format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}
