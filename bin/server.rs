// Training Catalog - Web Server
// JSON API over the category tree and the training flag

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use training_catalog::{
    get_database_path, init_logging, load_catalog, load_config, set_training_flag, CatalogError,
    CategoryId, CategoryView, Training,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

/// Map a failure to a status: unknown or unfed categories are 404, the rest 500
fn failure(context: &str, err: anyhow::Error) -> Response {
    let status = match err.downcast_ref::<CatalogError>() {
        Some(CatalogError::CategoryNotFound(_)) | Some(CatalogError::CategoryNotFed(_)) => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(error = %err, "{}", context);
    error_response(status, err.to_string())
}

fn lock_db(state: &AppState) -> Result<MutexGuard<'_, Connection>, Response> {
    state.db.lock().map_err(|_| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "database lock poisoned".to_string(),
        )
    })
}

/// Training flag update body
#[derive(Deserialize)]
struct TrainingFlagRequest {
    is_training: bool,
}

#[derive(Serialize)]
struct TrainingFlagResponse {
    id: CategoryId,
    is_training: bool,
    changed: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/categories - Every fed category with its hierarchy
async fn get_categories(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    let views = load_catalog(&conn).and_then(|catalog| Ok(catalog.category_views()?));
    match views {
        Ok(views) => ApiResponse::<Vec<CategoryView>>::ok(views),
        Err(e) => failure("Error getting categories", e),
    }
}

/// GET /api/trainings - Categories flagged as trainings
async fn get_trainings(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(response) => return response,
    };

    match load_catalog(&conn) {
        Ok(catalog) => ApiResponse::<Vec<Training>>::ok(catalog.trainings.trainings().to_vec()),
        Err(e) => failure("Error getting trainings", e),
    }
}

/// PUT /api/categories/:id/training - Set the training flag
async fn put_training_flag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<TrainingFlagRequest>,
) -> Response {
    let mut conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(response) => return response,
    };
    let id = CategoryId(id);

    let result = load_catalog(&conn).and_then(|mut catalog| {
        set_training_flag(
            &mut conn,
            &mut catalog.store,
            &mut catalog.trainings,
            id,
            request.is_training,
        )
    });

    match result {
        Ok(changed) => ApiResponse::ok(TrainingFlagResponse {
            id,
            is_training: request.is_training,
            changed,
        }),
        Err(e) => failure("Error setting training flag", e),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/categories", get(get_categories))
        .route("/categories/:id/training", put(put_training_flag))
        .route("/trainings", get(get_trainings))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(None)?;
    init_logging(&config.log);

    println!("🌐 Training Catalog - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = get_database_path(&config);
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: training-catalog init");
        std::process::exit(1);
    }

    let conn = Connection::open(&db_path)?;
    println!("✓ Database opened: {:?}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    println!("\n🚀 Server running on http://{}", config.server.bind);
    println!("   API: http://{}/api/categories", config.server.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
