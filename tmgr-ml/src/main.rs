//! tmgr-ml - Model retraining pipeline microservice
//!
//! Consumes committed annotation edits, maintains the feedback dataset,
//! executes external training runs one at a time, and serves aggregate
//! adjustment signals to the inference pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tmgr_ml::config::{ServiceSettings, TrainingConfig, DEFAULT_PORT};
use tmgr_ml::services::{
    training_queue, DatasetAppender, DatasetLayout, ModelPromoter, ProcessExecutor,
    TrainingPipeline, TrainingWorker,
};
use tmgr_ml::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "tmgr-ml", about = "Transformer-manager model retraining pipeline")]
struct Args {
    /// Root data folder (overrides TMGR_ROOT and the config file)
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Service config file (default: <root>/tmgr-ml.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP listen port
    #[arg(long, env = "TMGR_ML_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber first
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting tmgr-ml v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let root_folder = tmgr_common::config::resolve_root_folder(args.root_folder.as_deref());
    tmgr_common::config::ensure_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());

    let settings_path = args
        .config
        .unwrap_or_else(|| root_folder.join("tmgr-ml.toml"));
    let settings = ServiceSettings::load(&settings_path)?;
    let port = args.port.or(settings.port).unwrap_or(DEFAULT_PORT);

    let training = TrainingConfig::resolve(&root_folder, settings.training);
    training.prepare()?;
    info!("Feedback dataset root: {}", training.dataset_root.display());

    let db_path = tmgr_common::config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db = tmgr_common::db::init_database_pool(&db_path).await?;
    tmgr_ml::db::init_tables(&db).await?;

    // Assemble the pipeline: appender, queue, worker, executor, promoter
    let layout = DatasetLayout::new(&training.dataset_root);
    let appender = DatasetAppender::new(layout.clone(), &training.upload_dir);

    let (queue, rx) = training_queue();
    let executor = Arc::new(ProcessExecutor::new(
        &training.trainer_program,
        training.trainer_script.clone(),
        &layout.manifest,
        &layout.images_dir,
        &training.base_model,
        &training.versions_root,
        training.execution_timeout,
    ));
    let promoter = training
        .auto_promote
        .then(|| ModelPromoter::new(&training.base_model));

    let shutdown = CancellationToken::new();
    let worker = TrainingWorker::new(db.clone(), executor, promoter, &training.versions_root);
    let worker_handle = tokio::spawn(worker.run(rx, shutdown.clone()));

    let pipeline = Arc::new(TrainingPipeline::new(
        db.clone(),
        appender,
        queue,
        training.enabled,
        training.auto_trigger,
    ));

    let state = AppState::new(db, pipeline);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("tmgr-ml listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the worker loop; an in-flight training process is not killed
    // beyond the configured execution timeout
    shutdown.cancel();
    let _ = worker_handle.await;

    Ok(())
}
