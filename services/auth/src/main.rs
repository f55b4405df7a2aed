use sea_orm::Database;
use tracing::info;

use atelier_auth::config::AuthConfig;
use atelier_auth::infra::dispatch::ChannelDispatcher;
use atelier_auth::infra::sweeper::spawn_sweeper;
use atelier_auth::router::build_router;
use atelier_auth::state::AppState;
use atelier_core::config::Config;
use atelier_core::tracing::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AuthConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let dispatcher =
        ChannelDispatcher::from_config(&config).expect("invalid dispatch configuration");

    let state = AppState {
        db,
        dispatcher,
        otp_policy: config.otp_policy(),
        account_policy: config.account_policy(),
        session_ttl: config.session_ttl(),
        cookie_domain: config.cookie_domain.clone(),
        cookie_force_secure: config.cookie_secure,
        login_path: config.login_path.clone(),
    };

    spawn_sweeper(
        state.otp_repo(),
        state.session_repo(),
        config.sweep_interval(),
    );

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.auth_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("auth service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
