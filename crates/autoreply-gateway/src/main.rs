//! Autoreply Gateway — control surface and messaging bridge webhook.
//! GET /status, POST /toggle, GET /qr, GET /health, POST /bridge/events.

use anyhow::Context;
use autoreply_core::{
    pairing, AppConfig, BridgeEvent, BridgeIngress, BridgeMessenger, ConversationRouter,
    CredentialSource, Dispatcher, GeminiCompletion, KnowledgeResponder, LoopbackMessenger,
    Messenger, MetadataServerToken, PairingState, PresenceFlag, SessionRegistry, StaticToken,
    TokenProvider, BRIDGE_TOKEN_HEADER,
};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Clone)]
struct AppState {
    presence: Arc<PresenceFlag>,
    pairing: Arc<PairingState>,
    router: Arc<ConversationRouter>,
    bridge_token: Option<String>,
    /// Set when no bridge is configured; inbound messages are recorded here so replies have context.
    dry_run: Option<Arc<LoopbackMessenger>>,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[autoreply] no .env loaded: {}", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let knowledge = Arc::new(config.knowledge().context("loading knowledge base")?);
    tracing::info!("[SYSTEM] Assistant speaking for {}", knowledge.owner);

    let tokens: Arc<dyn TokenProvider> = match config.credentials.source {
        CredentialSource::Static => Arc::new(StaticToken::new(
            config.credentials.token.clone().unwrap_or_default(),
        )),
        CredentialSource::Metadata => Arc::new(MetadataServerToken::new(
            config.credentials.metadata_url.clone(),
        )),
    };
    let backend = Arc::new(GeminiCompletion::new(
        config.completion.endpoint.clone(),
        tokens,
        config.completion.request_timeout(),
    ));
    let responder = Arc::new(KnowledgeResponder::new(knowledge, backend));

    let (messenger, dry_run): (Arc<dyn Messenger>, Option<Arc<LoopbackMessenger>>) =
        match config.bridge.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                tracing::info!("[SYSTEM] Messaging bridge at {}", url);
                (
                    Arc::new(BridgeMessenger::new(url, config.bridge.token.clone())),
                    None,
                )
            }
            _ => {
                tracing::warn!("[SYSTEM] bridge.base_url not set; running in dry-run mode (replies are only logged)");
                let loopback = Arc::new(LoopbackMessenger::new());
                (loopback.clone(), Some(loopback))
            }
        };

    let presence = Arc::new(PresenceFlag::new(config.presence.initial));
    let sessions = Arc::new(SessionRegistry::with_ttl(config.sessions.ttl()));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&presence),
        sessions,
        messenger,
        responder,
    ));

    let router = Arc::new(ConversationRouter::new(dispatcher));
    if config.sessions.ttl().is_some() {
        spawn_session_pruner(Arc::clone(&router));
    }

    let state = AppState {
        presence,
        pairing: Arc::new(PairingState::new()),
        router,
        bridge_token: config.bridge.token.clone().filter(|t| !t.trim().is_empty()),
        dry_run,
    };

    let app = build_app(state).layer(axum::middleware::from_fn(log_control_traffic));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("[SYSTEM] API running at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving control API")?;
    Ok(())
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/toggle", post(toggle))
        .route("/qr", get(qr_page))
        .route("/bridge/events", post(bridge_events))
        .with_state(state)
}

/// Expired sessions go first, then the idle workers they leave behind.
fn spawn_session_pruner(router: Arc<ConversationRouter>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            let removed = router.dispatcher().sessions().prune();
            if removed > 0 {
                tracing::info!("[SESSIONS] Expired {} session(s)", removed);
            }
            let stopped = router.prune_idle_workers();
            if stopped > 0 {
                tracing::info!("[SESSIONS] Stopped {} idle conversation worker(s)", stopped);
            }
        }
    });
}

async fn log_control_traffic(
    connect: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = connect
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::info!("[HTTP] {} {} from {}", request.method(), request.uri().path(), peer);
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        status: state.presence.get().label(),
    })
}

async fn toggle(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        status: state.presence.toggle().label(),
    })
}

/// Pairing display: the current code from the bridge as a scannable QR image.
async fn qr_page(State(state): State<AppState>) -> Response {
    let Some(code) = state.pairing.current_code().await else {
        return Html("✅ Bot is ready or QR code not available yet. Refresh the page.").into_response();
    };
    match pairing::render_svg(&code) {
        Ok(svg) => Html(format!(
            r#"<h3>Scan with WhatsApp → Linked devices</h3><div id="pairing-qr">{}</div>"#,
            svg
        ))
        .into_response(),
        Err(e) => {
            tracing::error!("[PAIRING] {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error generating QR code.").into_response()
        }
    }
}

/// Constant-time comparison of the shared bridge secret.
fn token_matches(observed: &str, expected: &str) -> bool {
    observed.as_bytes().ct_eq(expected.as_bytes()).into()
}

async fn bridge_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if let Some(expected) = state.bridge_token.as_deref() {
        let observed = headers
            .get(BRIDGE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or("");
        if !token_matches(observed, expected) {
            tracing::warn!("[BRIDGE] Rejected event with invalid bridge token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error":{"code":"invalid_token","message":"bridge token mismatch"}})),
            );
        }
    }

    let event = match serde_json::from_str::<BridgeEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("[BRIDGE] Unparseable event: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error":{"code":"parse_failed","message":e.to_string()}})),
            );
        }
    };

    match BridgeIngress::from(event) {
        BridgeIngress::Lifecycle(event) => {
            state.pairing.apply(event).await;
            (StatusCode::OK, Json(json!({"accepted": true})))
        }
        BridgeIngress::Message(msg) if msg.is_group => {
            (StatusCode::OK, Json(json!({"accepted": true, "ignored": "group"})))
        }
        BridgeIngress::Message(msg) => {
            if let Some(loopback) = &state.dry_run {
                if msg.sender_is_owner {
                    loopback.record_outbound(&msg.conversation_id, &msg.body);
                } else {
                    loopback.record_inbound(&msg.conversation_id, &msg.body);
                }
            }
            state.router.route(msg);
            (StatusCode::OK, Json(json!({"accepted": true})))
        }
    }
}
