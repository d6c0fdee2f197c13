// File: maitri-server/src/main.rs

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maitri_core::Database;
use maitri_core::repositories::postgres::SessionHistoryRepository;
use maitri_core::services::{BookingService, CaseService, NoopNotifier, SchedulingService};

mod routes;
use routes::AppState;

#[derive(Parser, Debug, Clone)]
#[command(name = "maitri")]
#[command(author, version, about = "Maitri - university counseling appointment backend")]
struct Args {
    /// Address to which the server will bind
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Postgres connection URL; DATABASE_URL in the environment wins.
    #[arg(long, default_value = "postgres://maitri@localhost:5432/maitri")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| args.database_url.clone());

    let db = Database::new(&database_url).await?;
    db.migrate().await?;

    let state = AppState {
        booking: Arc::new(BookingService::new(db.clone(), Arc::new(NoopNotifier))),
        cases: Arc::new(CaseService::new(db.clone())),
        scheduling: Arc::new(SchedulingService::new(db.clone())),
        history: Arc::new(SessionHistoryRepository::new(db.pool().clone())),
    };

    let app = routes::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    info!("Listening on {}", args.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
