use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use harbor_api::auth::{self, AppState, AppStateInner};
use harbor_api::messages;
use harbor_api::middleware::require_auth;
use harbor_api::users;
use harbor_gateway::connection;
use harbor_gateway::content::ContentStore;
use harbor_gateway::registry::Registry;
use harbor_gateway::relay::Relay;

/// Header carrying the session token during the WebSocket handshake; the
/// handshake happens before the client has cookie access in this context.
const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Clone)]
struct ServerState {
    registry: Registry,
    relay: Arc<Relay>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HARBOR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("HARBOR_DB_PATH").unwrap_or_else(|_| "harbor.db".into());
    let upload_dir = std::env::var("HARBOR_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
    let client_url = std::env::var("HARBOR_CLIENT_URL").ok();
    let host = std::env::var("HARBOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HARBOR_PORT")
        .unwrap_or_else(|_| "4000".into())
        .parse()?;

    // Shared state
    let db = Arc::new(harbor_db::Database::open(&PathBuf::from(&db_path))?);
    let content = ContentStore::new(PathBuf::from(&upload_dir)).await?;
    let registry = Registry::new();
    let relay = Arc::new(Relay::new(db.clone(), content.clone(), registry.clone()));

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        registry: registry.clone(),
    });

    let server_state = ServerState {
        registry,
        relay,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/", get(health))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/allUsers", get(users::all_users))
        .route("/allClients", get(users::all_clients))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/profile", get(auth::profile))
        .route("/messages/{other_username}", get(messages::get_conversation))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(server_state);

    // Cookies need a concrete origin for credentialed CORS; without a
    // configured client URL, fall back to the permissive layer.
    let cors = match client_url.as_deref() {
        Some(origin) if !origin.is_empty() => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        _ => CorsLayer::permissive(),
    };

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Harbor server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<&'static str> {
    Json("Server is live")
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    ws.on_upgrade(move |socket| {
        connection::handle_socket(socket, state.registry, state.relay, state.jwt_secret, token)
    })
}
