use actix_web::HttpResponse;

use crate::routes::ApiResponse;

pub async fn health_check() -> HttpResponse {
    tracing::debug!("Health check endpoint called");
    HttpResponse::Ok().finish()
}

/// GET /
pub async fn home() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::message("Backend is live!"))
}
