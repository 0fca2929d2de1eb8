use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use boxoffice::allocator::{Allocator, PgAllocator};
use boxoffice::cancel::Cancellation;
use boxoffice::clock::ArrivalClock;
use boxoffice::config::Config;
use boxoffice::intake::Intake;
use boxoffice::query::QueueQuery;
use boxoffice::queue::QueueProcessor;
use boxoffice::routes::{create_routes, AppState};
use boxoffice::store::{
    EventStore, IntentStore, PgEventStore, PgIntentStore, PgTicketStore, TicketStore,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let events: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
    let intents: Arc<dyn IntentStore> = Arc::new(PgIntentStore::new(pool.clone()));
    let tickets: Arc<dyn TicketStore> = Arc::new(PgTicketStore::new(pool.clone()));
    let allocator: Arc<dyn Allocator> = Arc::new(PgAllocator::new(pool.clone()));
    let clock = Arc::new(ArrivalClock::new());

    let processor = Arc::new(QueueProcessor::new(
        Arc::clone(&intents),
        allocator,
        config.queue.clone(),
    ));

    let state = AppState {
        events: Arc::clone(&events),
        intake: Arc::new(Intake::new(
            Arc::clone(&events),
            Arc::clone(&intents),
            clock,
            config.queue.clone(),
        )),
        cancellation: Arc::new(Cancellation::new(Arc::clone(&intents))),
        query: Arc::new(QueueQuery::new(
            events,
            intents,
            tickets,
            config.queue.clone(),
        )),
        processor_health: processor.health(),
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let workers = processor.start(&shutdown_tx);
    tracing::info!("Queue processor started");

    let app: Router = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    // Server drained; stop the queue processor before exiting.
    let _ = shutdown_tx.send(());
    for worker in workers {
        let _ = worker.await;
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
}
