use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    sqlx::postgres::PgPoolOptions,
    std::{env, time::Duration},
    tokio::{signal, sync::watch},
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let gateway_webhook_secret =
        env::var("GATEWAY_WEBHOOK_SECRET").expect("GATEWAY_WEBHOOK_SECRET must be set");
    let report_signing_secret =
        env::var("REPORT_SIGNING_SECRET").expect("REPORT_SIGNING_SECRET must be set");
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let recon_interval = env_secs("RECON_INTERVAL_SECS", 24 * 60 * 60);
    let sweep_interval = env_secs("SWEEP_INTERVAL_SECS", 60);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = care_ledger::AppState {
        pool: pool.clone(),
        gateway_webhook_secret: gateway_webhook_secret.into(),
        report_signing_secret: report_signing_secret.clone().into(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(care_ledger::services::reconciliation::run_scheduler(
        pool.clone(),
        report_signing_secret,
        Duration::from_secs(recon_interval),
        shutdown_rx.clone(),
    ));
    tokio::spawn(care_ledger::services::expiry::run_sweeper(
        pool,
        Duration::from_secs(sweep_interval),
        shutdown_rx,
    ));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/routing/candidates",
            get(care_ledger::adapters::api::find_candidates),
        )
        .route(
            "/reservations",
            post(care_ledger::adapters::api::create_reservation),
        )
        .route(
            "/bookings/{id}/confirm",
            post(care_ledger::adapters::api::confirm_booking),
        )
        .route(
            "/bookings/{id}/cancel",
            post(care_ledger::adapters::api::cancel_booking),
        )
        .route(
            "/webhook",
            post(care_ledger::adapters::webhook::gateway_webhook_handler),
        )
        .route(
            "/payments/confirm",
            post(care_ledger::adapters::api::confirm_payment),
        )
        .route(
            "/reconciliation/run",
            post(care_ledger::adapters::api::run_reconciliation),
        )
        .route(
            "/reconciliation/latest",
            get(care_ledger::adapters::api::latest_report),
        )
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(64 * 1024)) // gateway events are small
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    let _ = shutdown_tx.send(true);
}

fn env_secs(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
