use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::bot::{render, render_error, CommandError, CommandRouter, Inbound};
use crate::ledger::{LedgerError, Outcome, SessionKey, UserId};

pub const ADMIN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AppState {
    pub router: CommandRouter,
    pub admin_token: String,
    /// Maps "now" to a session window; swapped for a fixed key in tests.
    pub session_clock: fn() -> SessionKey,
}

impl AppState {
    fn is_admin(&self, headers: &HeaderMap) -> bool {
        headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.admin_token)
    }
}

/// Build the Axum router for the command gateway and dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/messages", post(message_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/settlement", get(settlement_handler))
        .route("/api/sessions/current", get(current_session_handler))
        .route("/api/users/:user_id/wagers", get(user_wagers_handler))
        .route("/api/outcomes/:outcome/users", get(outcome_users_handler))
        .route("/api/snapshots/:user_id", get(snapshot_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub text: String,
}

fn status_for(err: &CommandError) -> StatusCode {
    match err {
        CommandError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        CommandError::UnknownCommand(_) => StatusCode::NOT_FOUND,
        CommandError::Usage(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommandError::Ledger(LedgerError::SessionClosed(_)) => StatusCode::CONFLICT,
        CommandError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn error_kind(err: &CommandError) -> &'static str {
    match err {
        CommandError::PermissionDenied { .. } => "permission_denied",
        CommandError::UnknownCommand(_) => "unknown_command",
        CommandError::Usage(_) => "usage",
        CommandError::Ledger(LedgerError::SessionClosed(_)) => "session_closed",
        CommandError::Ledger(LedgerError::NoValidEntries { .. }) => "no_valid_entries",
        CommandError::Ledger(LedgerError::InvalidRange { .. }) => "invalid_range",
        CommandError::Ledger(LedgerError::TotalOverflow { .. }) => "total_overflow",
    }
}

fn denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "permission_denied", "text": "admin token required" })),
    )
        .into_response()
}

/// POST /api/messages
async fn message_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Response {
    if req.user_id.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "usage", "text": "user_id is required" })),
        )
            .into_response();
    }
    let inbound = Inbound {
        user_id: UserId::new(req.user_id.trim()),
        display_name: req.display_name.unwrap_or_default(),
        session_key: (state.session_clock)(),
        text: req.text,
        is_admin: state.is_admin(&headers),
    };
    match state.router.handle(&inbound) {
        Ok(reply) => {
            let text = render(&reply);
            Json(json!({ "reply": reply, "text": text })).into_response()
        }
        Err(err) => (
            status_for(&err),
            Json(json!({ "error": error_kind(&err), "text": render_error(&err) })),
        )
            .into_response(),
    }
}

/// GET /api/summary
async fn summary_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    let store = state.router.store();
    Json(json!({
        "totals": store.summary(),
        "winning_outcome": store.winning_outcome(),
        "wagers": store.wager_count(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SettlementQuery {
    /// Preview against this number instead of the designated winner
    pub winning: Option<Outcome>,
}

/// GET /api/settlement?winning=07
async fn settlement_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SettlementQuery>,
) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    let store = state.router.store();
    let report = match query.winning {
        Some(outcome) => store.settle_with(Some(outcome)),
        None => store.settle(),
    };
    Json(report).into_response()
}

/// GET /api/users/:user_id/wagers (empty for users without activity)
async fn user_wagers_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    let user = UserId::new(user_id);
    let store = state.router.store();
    Json(json!({
        "account": store.account(&user),
        "wagers": store.user_wagers(&user),
    }))
    .into_response()
}

/// GET /api/outcomes/:outcome/users
async fn outcome_users_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(outcome): Path<Outcome>,
) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    Json(state.router.store().per_outcome_user_totals(outcome)).into_response()
}

/// GET /api/snapshots/:user_id
async fn snapshot_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    match state.router.store().stored_snapshot(&UserId::new(user_id)) {
        Some(snap) => Json(snap).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "text": "no overbuy snapshot for that user" })),
        )
            .into_response(),
    }
}

/// GET /api/sessions/current
async fn current_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !state.is_admin(&headers) {
        return denied();
    }
    let key = (state.session_clock)();
    let store = state.router.store();
    Json(json!({
        "session_key": key,
        "open": store.is_open(&key),
        "known": store.sessions(),
    }))
    .into_response()
}

/// Serve the dashboard page.
async fn index_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Wager Ledger</title>
<style>
  :root { --bg:#0f1117; --card:#1a1d27; --border:#2a2d3a; --accent:#6c63ff; --green:#00c896; --red:#ff4f6a; --text:#e0e0e0; --muted:#8888aa; }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; }
  .badge.open { background: var(--green); color: #000; }
  .badge.closed { background: var(--red); color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; }
  .grid { display: grid; grid-template-columns: repeat(10, 1fr); gap: 1px; background: var(--border); }
  .cell { background: var(--card); padding: .5rem; font-size: .8rem; }
  .cell .n { color: var(--muted); }
  .cell.hit { outline: 2px solid var(--accent); }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  .pos { color: var(--green); } .neg { color: var(--red); }
  .warn { padding: .6rem 1.2rem; color: #ff9800; font-size: .85rem; }
</style>
</head>
<body>
<header>
  <h1>📒 Wager Ledger</h1>
  <span class="badge" id="session">…</span>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="last-updated"></span>
</header>
<main>
  <div class="panel">
    <div class="panel-header">Totals per number</div>
    <div class="grid" id="grid"></div>
  </div>
  <div class="panel">
    <div class="panel-header">Settlement</div>
    <div class="warn" id="provisional" hidden>No winning number set; results are provisional.</div>
    <table>
      <thead><tr><th>User</th><th>Total</th><th>Com</th><th>After Com</th><th>Exposure</th><th>Za</th><th>Win</th><th>Result</th></tr></thead>
      <tbody id="settlement"></tbody>
    </table>
  </div>
</main>
<script>
const token = localStorage.getItem('adminToken') || prompt('Admin token') || '';
localStorage.setItem('adminToken', token);
const get = path => fetch(path, { headers: { 'x-admin-token': token } }).then(r => r.ok ? r.json() : null);
const pad = n => String(n).padStart(2, '0');

// Text-only element builder: user-supplied values only ever land in textContent.
function el(tag, text, className) {
  const node = document.createElement(tag);
  if (text !== undefined) node.textContent = String(text);
  if (className) node.className = className;
  return node;
}

async function loadAll() {
  const [summary, settlement, session] = await Promise.all([
    get('/api/summary'), get('/api/settlement'), get('/api/sessions/current'),
  ]);
  if (session) {
    const b = document.getElementById('session');
    b.textContent = session.session_key + (session.open ? ' open' : ' closed');
    b.className = 'badge ' + (session.open ? 'open' : 'closed');
  }
  if (summary) {
    const cells = Array.from({ length: 100 }, (_, i) => {
      const cell = el('div', undefined, summary.winning_outcome === i ? 'cell hit' : 'cell');
      cell.append(el('span', pad(i), 'n'), ' ' + (summary.totals[i] || ''));
      return cell;
    });
    document.getElementById('grid').replaceChildren(...cells);
  }
  if (settlement) {
    document.getElementById('provisional').hidden = !settlement.provisional;
    const rows = settlement.records.map(r => {
      const owed = r.direction === 'house_owes_user';
      const tr = el('tr');
      tr.append(
        el('td', r.display_name), el('td', r.total_wagered),
        el('td', `${r.commission_amount} (${r.commission_percent}%)`), el('td', r.after_commission),
        el('td', r.exposure), el('td', r.payout_multiplier), el('td', r.win_amount),
        el('td', (owed ? '-' : '+') + r.net_amount, owed ? 'neg' : 'pos'),
      );
      return tr;
    });
    document.getElementById('settlement').replaceChildren(...rows);
  }
  document.getElementById('last-updated').textContent = 'Updated ' + new Date().toLocaleTimeString();
}

loadAll();
setInterval(loadAll, 5000);
</script>
</body>
</html>"#;
