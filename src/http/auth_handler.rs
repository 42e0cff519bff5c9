use actix_web::{http::header, web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::api_error::ApiError;
use crate::auth::middleware::{AuthMiddleware, IdentityExt};
use crate::models::session::SessionSummary;
use crate::models::user::{LoginRequest, RegisterRequest};
use crate::service::session_service::SessionService;

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

/// POST /api/auth/register
pub async fn register(
    session_service: web::Data<SessionService>,
    req: HttpRequest,
    payload: web::Json<RegisterRequest>,
) -> Result<impl Responder, ApiError> {
    let mut request = payload.into_inner();
    request.normalize();
    request
        .validate()
        .map_err(|e| ApiError::Validation(describe_validation_errors(&e)))?;

    info!(username = %request.username, "registration request received");

    let response = session_service
        .register(request, device_info(&req), origin_address(&req))
        .await?;

    Ok(HttpResponse::Created().json(response))
}

/// POST /api/auth/login
pub async fn login(
    session_service: web::Data<SessionService>,
    req: HttpRequest,
    payload: web::Json<LoginRequest>,
) -> Result<impl Responder, ApiError> {
    let request = payload.into_inner();
    request
        .validate()
        .map_err(|e| ApiError::Validation(describe_validation_errors(&e)))?;

    info!("login request received");

    let response = session_service
        .login(request, device_info(&req), origin_address(&req))
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/auth/logout
pub async fn logout(
    session_service: web::Data<SessionService>,
    req: HttpRequest,
) -> Result<impl Responder, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    session_service.logout(token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// GET /api/auth/me (requires authentication)
pub async fn get_current_user(
    session_service: web::Data<SessionService>,
    req: HttpRequest,
) -> Result<impl Responder, ApiError> {
    let identity = req.identity().ok_or(ApiError::Unauthorized)?;
    let user = session_service.get_user(identity.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "mobile_number": user.mobile_number,
        "created_at": user.created_at,
    })))
}

/// GET /api/auth/sessions (requires authentication)
pub async fn list_sessions(
    session_service: web::Data<SessionService>,
    req: HttpRequest,
) -> Result<impl Responder, ApiError> {
    let identity = req.identity().ok_or(ApiError::Unauthorized)?;
    let sessions = session_service.list_sessions(identity.user_id).await?;
    let total = sessions.len();

    Ok(HttpResponse::Ok().json(SessionsResponse { sessions, total }))
}

/// GET /api/auth/validation-rules
pub async fn validation_rules() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "username": {
            "min_length": 3,
            "max_length": 50,
            "allowed_chars": "letters, numbers, underscores only",
            "restrictions": "cannot start or end with underscore"
        },
        "password": {
            "min_length": 8,
            "requirements": [
                "At least 1 uppercase letter",
                "At least 1 lowercase letter",
                "At least 1 digit",
                "At least 1 special character (!@#$%^&*(),.?\":{}|<>)",
                "ASCII characters only (no emojis or special language characters)"
            ]
        },
        "mobile_number": {
            "format": "10-15 digits",
            "example": "+1234567890 or 9876543210"
        }
    }))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, session_service: SessionService) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/validation-rules", web::get().to(validation_rules))
            .service(
                web::scope("")
                    .wrap(AuthMiddleware::new(session_service))
                    .route("/me", web::get().to(get_current_user))
                    .route("/sessions", web::get().to(list_sessions)),
            ),
    );
}

fn device_info(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn origin_address(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(str::to_string)
}

fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        for err in field_errors.iter() {
            match &err.message {
                Some(message) => parts.push(format!("{field}: {message}")),
                None => parts.push(format!("{field}: invalid value")),
            }
        }
    }
    parts.sort();
    parts.join("; ")
}
