//! Transient user messages.
//!
//! Handlers push notices as side effects (save failures, rejected imports,
//! read-only edits); `GET /api/notices` drains them as `role="alert"` markup.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::with_config;
use crate::error::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

impl NoticeKind {
    fn css(self) -> &'static str {
        match self {
            NoticeKind::Success => "text-emerald-600",
            NoticeKind::Error => "text-kip-red",
            NoticeKind::Info => "text-slate-600",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub duration_ms: u32,
}

impl Notice {
    pub fn render(&self) -> String {
        format!(
            r#"<div role="alert" class="notice {css}" data-duration="{ms}">{text}</div>"#,
            css = self.kind.css(),
            ms = self.duration_ms,
            text = escape_html(&self.text)
        )
    }
}

/// Escape text for element content and for both quoting styles of
/// attribute (`hx-vals` is single-quoted).
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

thread_local! {
    static NOTICES: RefCell<VecDeque<Notice>> = RefCell::new(VecDeque::new());
}

pub fn push(kind: NoticeKind, text: impl Into<String>) {
    let duration_ms = with_config(|c| c.notice_duration_ms);
    NOTICES.with(|n| {
        n.borrow_mut().push_back(Notice {
            kind,
            text: text.into(),
            duration_ms,
        })
    });
}

pub fn push_error(err: &GridError) {
    push(NoticeKind::Error, err.to_string());
}

/// Remove and return every queued notice, oldest first.
pub fn drain() -> Vec<Notice> {
    NOTICES.with(|n| n.borrow_mut().drain(..).collect())
}

pub fn render_drain() -> String {
    drain().iter().map(Notice::render).collect()
}

pub fn clear() {
    NOTICES.with(|n| n.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        clear();
        push(NoticeKind::Info, "first");
        push_error(&GridError::ReadOnlySession);
        let notices = drain();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].text, "first");
        assert_eq!(notices[1].kind, NoticeKind::Error);
        assert_eq!(notices[0].duration_ms, 5000);
        assert!(drain().is_empty());
    }

    #[test]
    fn render_escapes_text() {
        clear();
        push(NoticeKind::Success, "<b>saved</b>");
        let html = render_drain();
        assert!(html.contains(r#"role="alert""#));
        assert!(html.contains("&lt;b&gt;saved"));
        assert!(html.contains("text-emerald-600"));
        clear();
    }

    #[test]
    fn escape_covers_single_quoted_attributes() {
        assert_eq!(escape_html("o'neil"), "o&#39;neil");
        let vals = format!(r#"hx-vals='{{"id":"{}"}}'"#, escape_html("x'y"));
        assert_eq!(vals.matches('\'').count(), 2);
    }
}
