//! tmgr-ml library - feedback-driven model retraining pipeline
//!
//! Turns human corrections to AI-generated defect annotations into aggregate
//! adjustment signals and a growing file-backed training dataset, and tracks
//! the lifecycle of external retraining runs end to end.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

use services::{FeedbackAggregator, TrainingPipeline};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub pipeline: Arc<TrainingPipeline>,
    pub aggregator: FeedbackAggregator,
}

impl AppState {
    pub fn new(db: SqlitePool, pipeline: Arc<TrainingPipeline>) -> Self {
        let aggregator = FeedbackAggregator::new(db.clone());
        Self {
            db,
            pipeline,
            aggregator,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/api/training/runs", get(api::runs::list_runs))
        .route("/api/training/runs/:id", get(api::runs::get_run))
        .route("/api/training/runs/trigger", post(api::runs::trigger_run))
        .route("/api/feedback/annotations", post(api::feedback::submit_annotation))
        .route("/api/feedback/summary", get(api::feedback::feedback_summary))
        .route("/api/feedback/snapshot", post(api::feedback::feedback_snapshot))
        .route("/api/feedback/history", get(api::feedback::feedback_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
