use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gather_api::auth::{self, AppState, AppStateInner};
use gather_api::mailer::{Mailer, SmtpConfig};
use gather_api::middleware::{CurrentUser, require_auth};
use gather_api::{communities, messages, notifications, posts, search, users};
use gather_gateway::connection;
use gather_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gather=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("GATHER_DB_PATH").unwrap_or_else(|_| "gather.db".into());
    let host = std::env::var("GATHER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("GATHER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let base_url =
        std::env::var("GATHER_BASE_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));
    let cookie_secure = std::env::var("GATHER_COOKIE_SECURE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let mail_from =
        std::env::var("GATHER_MAIL_FROM").unwrap_or_else(|_| "Gather <no-reply@localhost>".into());

    // SMTP is optional — without it the mailer logs links instead of sending
    let smtp = std::env::var("GATHER_SMTP_HOST").ok().map(|smtp_host| SmtpConfig {
        host: smtp_host,
        username: std::env::var("GATHER_SMTP_USERNAME").unwrap_or_default(),
        password: std::env::var("GATHER_SMTP_PASSWORD").unwrap_or_default(),
    });
    let mailer = Mailer::new(smtp, &mail_from, base_url)?;

    // Init database
    let db = Arc::new(gather_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
        mailer,
        cookie_secure,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify", get(auth::verify))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot", post(auth::forgot_password))
        .route("/auth/reset", post(auth::reset_password));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me))
        .route("/users/me", patch(users::update_me))
        .route("/users/{username}", get(users::get_profile))
        .route("/posts", post(posts::create_post))
        .route("/posts", get(posts::get_feed))
        .route("/posts/{post_id}/archive", post(posts::archive_post))
        .route("/messages/{user_id}", get(messages::get_conversation))
        .route("/messages/{user_id}", post(messages::send_message))
        .route("/communities", post(communities::create_community))
        .route("/communities", get(communities::list_communities))
        .route("/communities/{community_id}", get(communities::get_community))
        .route("/search", get(search::search))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/gateway", get(ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gather server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The session cookie is validated by `require_auth` before the upgrade
/// completes, so the socket loop starts pre-authenticated.
async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            current.id,
            current.username,
        )
    })
}
