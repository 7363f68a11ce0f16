pub mod decision;
pub mod inference;
pub mod models;

use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use std::time::Instant;

use inference::ChurnModel;
use models::{ApiResponse, ChurnInput, DecisionResult, FeatureSchema, PredictError};

// Simplified per-IP rate limiting with dashmap
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static RATE_LIMIT_CACHE: Lazy<DashMap<String, (AtomicU32, Instant)>> = Lazy::new(DashMap::new);

const RATE_LIMIT_PER_MINUTE: u32 = 100;
const DECISION_THRESHOLD: f32 = 0.5;

/// Model and schema, loaded once at startup, read-only afterwards.
pub struct ServiceState {
    pub model: ChurnModel,
    pub schema: FeatureSchema,
}

/// Full decision pipeline: validate and bind, invoke the classifier, reason
/// over the outcome. Validation always precedes model invocation.
fn run_decision(state: &ServiceState, data: &[f64]) -> Result<DecisionResult, PredictError> {
    let row = state.schema.bind(data)?;
    let output = state.model.predict(data)?;
    Ok(decision::decide(&row, &output))
}

async fn home() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(
        "Welcome to the CPRS churn decision API",
    ))
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success("churn decision service ready"))
}

async fn model_info(state: web::Data<Arc<ServiceState>>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(state.model.info(&state.schema)))
}

async fn stats() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(inference::serving_stats()))
}

async fn predict_churn(
    state: web::Data<Arc<ServiceState>>,
    req: web::Json<ChurnInput>,
    request: HttpRequest,
) -> impl Responder {
    let start_time = Instant::now();

    if let Some(client_ip) = request.peer_addr().map(|addr| addr.ip().to_string()) {
        let now = Instant::now();
        let mut entry = RATE_LIMIT_CACHE
            .entry(client_ip.clone())
            .or_insert_with(|| (AtomicU32::new(0), now));

        // reset the window after a minute
        if now.duration_since(entry.1) > Duration::from_secs(60) {
            entry.0.store(0, Ordering::Relaxed);
            entry.1 = now;
        }

        let count = entry.0.fetch_add(1, Ordering::Relaxed);
        if count > RATE_LIMIT_PER_MINUTE {
            warn!("rate limit exceeded for IP: {}", client_ip);
            return HttpResponse::TooManyRequests()
                .json(ApiResponse::<DecisionResult>::error("rate limit exceeded"));
        }
    }

    info!("prediction request received");

    let state = state.get_ref().clone();
    let input = req.into_inner();

    match web::block(move || run_decision(&state, &input.data)).await {
        Ok(Ok(result)) => {
            info!(
                "prediction served: label={} probability={:.4} segment={}",
                result.prediction, result.churn_probability, result.risk_segment
            );
            inference::record_prediction(result.prediction);
            let mut response = ApiResponse::success(result);
            response.execution_time_ms = Some(start_time.elapsed().as_millis() as u64);
            HttpResponse::Ok().json(response)
        }
        Ok(Err(e @ PredictError::SchemaMismatch { .. })) => {
            error!("request rejected: {}", e);
            inference::record_failure();
            let mut response = ApiResponse::<DecisionResult>::error(&e.to_string());
            response.execution_time_ms = Some(start_time.elapsed().as_millis() as u64);
            HttpResponse::BadRequest().json(response)
        }
        Ok(Err(e)) => {
            error!("prediction failed: {}", e);
            inference::record_failure();
            let mut response = ApiResponse::<DecisionResult>::error(&e.to_string());
            response.execution_time_ms = Some(start_time.elapsed().as_millis() as u64);
            HttpResponse::InternalServerError().json(response)
        }
        Err(e) => {
            error!("blocking execution error: {}", e);
            inference::record_failure();
            let mut response = ApiResponse::<DecisionResult>::error("prediction execution error");
            response.execution_time_ms = Some(start_time.elapsed().as_millis() as u64);
            HttpResponse::InternalServerError().json(response)
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    info!("🚀 starting CPRS churn decision service");

    let model_path =
        env::var("MODEL_PATH").unwrap_or_else(|_| "models/churn_classifier.onnx".to_string());
    let features_path =
        env::var("FEATURES_PATH").unwrap_or_else(|_| "models/selected_features.json".to_string());

    let schema = match FeatureSchema::load(&features_path) {
        Ok(schema) => {
            info!("✅ feature schema loaded: {} features", schema.len());
            schema
        }
        Err(e) => {
            error!("❌ {}", e);
            panic!("cannot start without artifacts: {}", e);
        }
    };

    let model = match ChurnModel::load(&model_path, DECISION_THRESHOLD) {
        Ok(model) => {
            info!("✅ classifier artifact loaded");
            model
        }
        Err(e) => {
            error!("❌ {}", e);
            panic!("cannot start without artifacts: {}", e);
        }
    };

    let state = web::Data::new(Arc::new(ServiceState { model, schema }));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let workers = env::var("WORKERS")
        .map(|w| w.parse().unwrap_or(num_cpus::get()))
        .unwrap_or_else(|_| num_cpus::get());

    let bind_address = format!("{}:{}", host, port);

    info!("🌐 serving on: http://{}", bind_address);
    info!("👷 workers: {}", workers);
    info!("🔧 endpoints:");
    info!("   GET  /                - welcome");
    info!("   GET  /api/health      - liveness check");
    info!("   GET  /api/model-info  - classifier metadata");
    info!("   GET  /api/stats       - serving counters");
    info!("   POST /api/predict     - churn decision");

    HttpServer::new(move || {
        // the dashboard is the only cross-origin consumer
        let cors = Cors::default()
            .allowed_origin("http://localhost:8501")
            .allowed_origin("http://127.0.0.1:8501")
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(16 * 1024))
            .route("/", web::get().to(home))
            .route("/api/health", web::get().to(health_check))
            .route("/api/model-info", web::get().to(model_info))
            .route("/api/stats", web::get().to(stats))
            .route("/api/predict", web::post().to(predict_churn))
            .default_service(web::route().to(|| async {
                HttpResponse::NotFound().json(ApiResponse::<String>::error("endpoint not found"))
            }))
    })
    .workers(workers)
    .bind(&bind_address)?
    .run()
    .await
}
