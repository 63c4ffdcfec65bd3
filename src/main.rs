use clap::Parser;
use std::time::Instant;

use stroke_risk_service::{
    config::init_logging, create_router, ClassifierAdapter, HistoryLog, PredictionDb, Predictor,
    ResultStore, ServiceArgs,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();
    let args = ServiceArgs::parse();
    init_logging(&args);

    log::debug!("Arguments {:#?}", args);

    let classifier = ClassifierAdapter::load(&args.model_path);

    // the service keeps answering without the table; inserts are skipped
    let db = match PredictionDb::open(&args.database) {
        Ok(db) => {
            log::info!("Database initialized at {:?}", args.database);
            Some(db)
        }
        Err(e) => {
            log::error!("Database init error: {}", e);
            None
        }
    };

    let store = ResultStore::new(HistoryLog::new(), db, args.db_timeout());
    let predictor = Predictor::new(classifier, store, args.inference_timeout());
    let app = create_router(predictor);

    let addr = args.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!(
        "Stroke Detection API listening on {} (startup took {:?})",
        addr,
        start_time.elapsed()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    log::info!("Shutting down");
    Ok(())
}
