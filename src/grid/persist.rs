//! Save pipeline: sequenced save requests and the browser gateway.
//!
//! Every mutation updates the in-memory grid first, then issues a
//! [`SaveRequest`] with the next sequence number. The gateway renders it as a
//! `<script>` the page executes (localStorage write or `fetch`); the script
//! reports back through `POST /api/grid/ack`. Acks older than the latest
//! issued request are dropped, so a slow response can never report on a
//! state the user has already moved past. Failures never roll back.

use std::cell::RefCell;
use tracing::{debug, warn};

use crate::config::GridConfig;
use crate::error::GridError;
use crate::grid::session::{Session, SessionKind, ShareMode};

/// Where a grid document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistScope {
    /// Anonymous visitor: browser localStorage under `key`.
    Local { key: String },
    /// Logged-in user: `POST /api/save` with the bearer token.
    Profile {
        user_id: String,
        token: Option<String>,
    },
    /// Editable shared grid: `POST /api/share/{share_id}`.
    Snapshot { share_id: String },
}

impl PersistScope {
    /// Save target for a session. Read-only shares have none.
    pub fn for_session(session: &Session, config: &GridConfig) -> Option<Self> {
        match &session.kind {
            SessionKind::Local => Some(PersistScope::Local {
                key: config.grid_storage_key.clone(),
            }),
            SessionKind::Account { user_id } => Some(PersistScope::Profile {
                user_id: user_id.clone(),
                token: session.token.clone(),
            }),
            SessionKind::Shared {
                share_id,
                mode: ShareMode::ReadWrite,
                ..
            } => Some(PersistScope::Snapshot {
                share_id: share_id.clone(),
            }),
            SessionKind::Shared { .. } => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PersistScope::Local { key } => format!("local:{}", key),
            PersistScope::Profile { user_id, .. } => format!("profile:{}", user_id),
            PersistScope::Snapshot { share_id } => format!("share:{}", share_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub seq: u64,
    pub scope: PersistScope,
    /// Serialized `{layout, marks, skins}` document.
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Applied,
    /// Superseded by a newer request; ignored.
    Stale,
    Failed(GridError),
}

#[derive(Debug, Default)]
pub struct SaveQueue {
    last_issued: u64,
    pending: Option<(u64, String)>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next save. Sequence numbers start at 1.
    pub fn issue(&mut self, scope: PersistScope, document: String) -> SaveRequest {
        self.last_issued += 1;
        self.pending = Some((self.last_issued, scope.label()));
        debug!(seq = self.last_issued, scope = %scope.label(), "Save issued");
        SaveRequest {
            seq: self.last_issued,
            scope,
            document,
        }
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    /// Sequence number of the latest save still waiting for its ack.
    pub fn pending(&self) -> Option<u64> {
        self.pending.as_ref().map(|(seq, _)| *seq)
    }

    /// Forget the pending save when the session changes owner. Numbering
    /// carries on, so acks still in flight for the old owner read as stale.
    /// Returns the sequence number that was dropped.
    pub fn rebase(&mut self) -> Option<u64> {
        let dropped = self.pending();
        self.pending = None;
        dropped
    }

    pub fn acknowledge(&mut self, seq: u64, result: Result<(), String>) -> AckOutcome {
        let scope = match &self.pending {
            Some((latest, scope)) if *latest == seq => scope.clone(),
            _ => {
                debug!(seq, last_issued = self.last_issued, "Stale save ack dropped");
                return AckOutcome::Stale;
            }
        };
        self.pending = None;
        match result {
            Ok(()) => AckOutcome::Applied,
            Err(reason) => {
                warn!(seq, scope = %scope, reason = %reason, "Save failed");
                AckOutcome::Failed(GridError::PersistenceFailure { scope, reason })
            }
        }
    }
}

/// Anything that can carry a save request out of the engine.
pub trait PersistenceGateway {
    fn save(&mut self, request: &SaveRequest);
}

/// Gateway that turns save requests into `<script>` tags for the page.
#[derive(Debug, Default)]
pub struct ScriptBridge {
    outbox: Vec<String>,
}

impl ScriptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the rendered scripts, concatenated.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.outbox).concat()
    }
}

impl PersistenceGateway for ScriptBridge {
    fn save(&mut self, request: &SaveRequest) {
        self.outbox.push(render_save_script(request));
    }
}

/// Quote `s` as a JavaScript string literal safe to inline in `<script>`.
pub fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string())
        .to_string()
        .replace("</", "<\\/")
}

fn render_save_script(request: &SaveRequest) -> String {
    let seq = request.seq;
    let doc = js_string(&request.document);
    let ack = format!(
        "function(err){{htmx.ajax('POST','/api/grid/ack',{{values:{{seq:{},error:err||''}},target:'#grid-notices',swap:'beforeend'}});}}",
        seq
    );
    match &request.scope {
        PersistScope::Local { key } => format!(
            r#"<script>
(function() {{
  var ack = {ack};
  try {{ localStorage.setItem({key}, {doc}); ack(''); }} catch (e) {{ ack(String(e)); }}
}})();
</script>"#,
            ack = ack,
            key = js_string(key),
            doc = doc
        ),
        PersistScope::Profile { token, .. } => {
            let auth = match token {
                Some(t) => format!(", 'Authorization': 'Bearer ' + {}", js_string(t)),
                None => String::new(),
            };
            fetch_script(&ack, "/api/save", &auth, &doc)
        }
        PersistScope::Snapshot { share_id } => {
            fetch_script(&ack, &format!("/api/share/{}", share_id), "", &doc)
        }
    }
}

fn fetch_script(ack: &str, url: &str, auth: &str, doc: &str) -> String {
    format!(
        r#"<script>
(function() {{
  var ack = {ack};
  fetch({url}, {{method: 'POST', headers: {{'Content-Type': 'application/json'{auth}}}, body: {doc}}})
    .then(function(r) {{ ack(r.ok ? '' : 'HTTP ' + r.status); }})
    .catch(function(e) {{ ack(String(e)); }});
}})();
</script>"#,
        ack = ack,
        url = js_string(url),
        auth = auth,
        doc = doc
    )
}

thread_local! {
    static QUEUE: RefCell<SaveQueue> = RefCell::new(SaveQueue::new());
}

/// Execute a closure with mutable access to the save queue.
pub fn with_queue_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut SaveQueue) -> R,
{
    QUEUE.with(|q| f(&mut q.borrow_mut()))
}

pub fn reset_queue() {
    QUEUE.with(|q| *q.borrow_mut() = SaveQueue::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        saved: Vec<SaveRequest>,
    }

    impl PersistenceGateway for Recorder {
        fn save(&mut self, request: &SaveRequest) {
            self.saved.push(request.clone());
        }
    }

    fn local() -> PersistScope {
        PersistScope::Local {
            key: "gridState".into(),
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut queue = SaveQueue::new();
        let mut gateway = Recorder::default();
        for doc in ["{}", "{}", "{}"] {
            let request = queue.issue(local(), doc.to_string());
            gateway.save(&request);
        }
        let seqs: Vec<u64> = gateway.saved.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(queue.pending(), Some(3));
    }

    #[test]
    fn older_acks_are_discarded() {
        let mut queue = SaveQueue::new();
        queue.issue(local(), "{}".into());
        queue.issue(local(), "{}".into());
        // The first save fails after the second was already issued.
        assert_eq!(
            queue.acknowledge(1, Err("offline".into())),
            AckOutcome::Stale
        );
        assert_eq!(queue.acknowledge(2, Ok(())), AckOutcome::Applied);
        assert_eq!(queue.pending(), None);
        // Duplicate ack for an already settled request.
        assert_eq!(queue.acknowledge(2, Ok(())), AckOutcome::Stale);
    }

    #[test]
    fn rebase_keeps_numbering() {
        let mut queue = SaveQueue::new();
        queue.issue(local(), "{}".into());
        assert_eq!(queue.rebase(), Some(1));
        assert_eq!(queue.rebase(), None);
        let request = queue.issue(local(), "{}".into());
        assert_eq!(request.seq, 2);
        assert_eq!(queue.acknowledge(1, Err("late".into())), AckOutcome::Stale);
        assert_eq!(queue.acknowledge(2, Ok(())), AckOutcome::Applied);
    }

    #[test]
    fn latest_failure_is_reported() {
        let mut queue = SaveQueue::new();
        queue.issue(
            PersistScope::Profile {
                user_id: "u1".into(),
                token: None,
            },
            "{}".into(),
        );
        match queue.acknowledge(1, Err("HTTP 500".into())) {
            AckOutcome::Failed(GridError::PersistenceFailure { scope, reason }) => {
                assert_eq!(scope, "profile:u1");
                assert_eq!(reason, "HTTP 500");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn scope_follows_session() {
        let config = GridConfig::default();
        assert_eq!(
            PersistScope::for_session(&Session::default(), &config),
            Some(local())
        );
        let shared = |mode| Session {
            kind: SessionKind::Shared {
                share_id: "s1".into(),
                mode,
                persistent: true,
            },
            ..Session::default()
        };
        assert_eq!(
            PersistScope::for_session(&shared(ShareMode::ReadWrite), &config),
            Some(PersistScope::Snapshot {
                share_id: "s1".into()
            })
        );
        assert_eq!(
            PersistScope::for_session(&shared(ShareMode::ReadOnly), &config),
            None
        );
    }

    #[test]
    fn bridge_renders_scripts() {
        let mut queue = SaveQueue::new();
        let mut bridge = ScriptBridge::new();
        bridge.save(&queue.issue(local(), r#"{"layout":["a"]}"#.into()));
        let html = bridge.take();
        assert!(html.contains("localStorage.setItem(\"gridState\""));
        assert!(html.contains("seq:1"));
        assert!(bridge.take().is_empty());

        bridge.save(&queue.issue(
            PersistScope::Profile {
                user_id: "u1".into(),
                token: Some("t.k.n".into()),
            },
            "{}".into(),
        ));
        let html = bridge.take();
        assert!(html.contains("\"/api/save\""));
        assert!(html.contains("Bearer"));
    }

    #[test]
    fn js_string_escapes_script_close() {
        assert_eq!(js_string("a</script>"), r#""a<\/script>""#);
        assert_eq!(js_string("say \"hi\""), r#""say \"hi\"""#);
    }
}
