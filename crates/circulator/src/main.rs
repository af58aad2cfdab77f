use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{error, info};
use secrecy::ExposeSecret;
use tokio::net::TcpListener;

use circulator::ai::{load_embedder, load_summarizer};
use circulator::categorizer::DepartmentMatcher;
use circulator::db::{self, SeaOrmStudentDirectory};
use circulator::email::{DeliveryTracker, MessageComposer, Notifier, SmtpMailer};
use circulator::logging::{init_tracing, LogFormat};
use circulator::processor::TextExtractor;
use circulator::storage::UploadStore;
use circulator::worker::MailWorkerPool;
use circulator::{create_router, AppState, CircularPipeline, Config};

#[tokio::main]
async fn main() {
    init_tracing(LogFormat::from_env());
    info!("Starting circulator v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> circulator::Result<()> {
    let config = Config::from_env()?;

    let store = UploadStore::new(&config.server.upload_dir);
    store.ensure_directory()?;

    let database_url = config.database.connection_url()?;
    let connection = db::connect(
        database_url.expose_secret(),
        config.database.run_migrations,
    )
    .await?;
    let directory = SeaOrmStudentDirectory::new(connection);

    // Weight downloads and model loading block; keep them off the runtime.
    let ai_config = config.ai.clone();
    let (summarizer, embedder) = tokio::task::spawn_blocking(move || {
        Ok::<_, circulator::CirculatorError>((
            load_summarizer(&ai_config)?,
            load_embedder(&ai_config)?,
        ))
    })
    .await
    .map_err(|e| circulator::ProcessError::TaskFailed(e.to_string()))??;
    info!("Models loaded");

    let tracker = Arc::new(DeliveryTracker::default());
    let composer = MessageComposer::new(&config.mail.from, config.mail.subject.clone())?;
    let pool = MailWorkerPool::new(
        Arc::new(SmtpMailer::new(&config.mail)?),
        composer,
        Arc::clone(&tracker),
        config.mail.workers,
        config.mail.queue_capacity,
    );
    let notifier = Arc::new(Notifier::new(pool, tracker));

    let pipeline = CircularPipeline::new(
        Arc::new(store),
        Arc::new(TextExtractor::new(&config.ocr)),
        summarizer,
        Arc::new(DepartmentMatcher::new(
            embedder,
            config.ai.similarity_threshold,
        )),
        Arc::new(directory),
        Arc::clone(&notifier),
    );

    let app = create_router(
        AppState::new(Arc::new(pipeline)),
        config.server.max_upload_bytes,
    );

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Draining mail queue...");
    tokio::task::spawn_blocking(move || notifier.shutdown())
        .await
        .map_err(|e| circulator::ProcessError::TaskFailed(e.to_string()))?;
    served?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
