/// Authentication Routes
///
/// Handles registration, login, token refresh, logout and current user
/// information. The refresh token only ever travels in an http-only cookie;
/// the access token is returned in the body for bearer use.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountService, RegisterRequest};
use crate::auth::{Claims, LogoutOutcome, SessionManager};
use crate::configuration::CookieSettings;
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::routes::{ApiResponse, UserResponse};

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: &'static str,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

fn refresh_cookie(settings: &CookieSettings, token: &str, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(settings.name.clone(), token.to_string())
        .path(settings.path.clone())
        .http_only(true)
        .secure(settings.secure)
        .same_site(settings.same_site())
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

fn removal_cookie(settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = Cookie::build(settings.name.clone(), "")
        .path(settings.path.clone())
        .http_only(true)
        .secure(settings.secure)
        .same_site(settings.same_site())
        .finish();
    cookie.make_removal();
    cookie
}

/// POST /register
///
/// # Errors
/// - 400: Validation errors (email, userName, phone, location, password)
/// - 409: Email or phone already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.register(form.into_inner()).await?;

    Ok(HttpResponse::Created().json(
        ApiResponse::data(UserResponse::from(user)).with_message("User registered successfully"),
    ))
}

/// POST /login
///
/// Returns the access token in the body and sets the refresh token cookie.
///
/// # Errors
/// - 400: Missing email or password
/// - 401: Invalid credentials (same response for unknown email and wrong password)
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = form
        .email
        .as_deref()
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| ValidationError::EmptyField("email".to_string()))?;
    let password = form
        .password
        .as_deref()
        .filter(|password| !password.is_empty())
        .ok_or_else(|| ValidationError::EmptyField("password".to_string()))?;

    let outcome = sessions.login(email, password).await?;
    let policy = sessions.policy();

    context
        .with_user_id(outcome.user.id)
        .log_success("User logged in successfully");

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&cookie_settings, &outcome.refresh.token, policy.refresh_ttl))
        .json(LoginResponse {
            success: true,
            message: "Login successful",
            access_token: outcome.access.token,
            token_type: "Bearer",
            expires_in: policy.access_ttl,
            user: UserResponse::from(outcome.user),
        }))
}

/// POST /refresh
///
/// Reads the refresh token cookie and returns a new access token. With
/// rotation enabled the cookie is replaced and the old token revoked.
///
/// # Errors
/// - 401: Missing, invalid, expired or revoked refresh token
pub async fn refresh(
    req: HttpRequest,
    sessions: web::Data<SessionManager>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = req.cookie(&cookie_settings.name);
    let outcome = sessions.refresh(presented.as_ref().map(|c| c.value())).await?;
    let policy = sessions.policy();

    context
        .with_user_id(outcome.user_id)
        .log_success("Token refreshed successfully");

    let mut response = HttpResponse::Ok();
    if let Some(rotated) = &outcome.refresh {
        response.cookie(refresh_cookie(&cookie_settings, &rotated.token, policy.refresh_ttl));
    }

    Ok(response.json(RefreshResponse {
        success: true,
        access_token: outcome.access.token,
        token_type: "Bearer",
        expires_in: policy.access_ttl,
    }))
}

/// POST /logout
///
/// Always succeeds and always clears the cookie. Revocation is best effort.
pub async fn logout(
    req: HttpRequest,
    sessions: web::Data<SessionManager>,
    cookie_settings: web::Data<CookieSettings>,
) -> HttpResponse {
    let context = ErrorContext::new("logout");

    let presented = req.cookie(&cookie_settings.name);
    match sessions.logout(presented.as_ref().map(|c| c.value())).await {
        LogoutOutcome::Revoked => context.log_success("Refresh token revoked on logout"),
        LogoutOutcome::AlreadyRevoked | LogoutOutcome::NoToken => {
            tracing::debug!(
                request_id = %context.request_id,
                operation = %context.operation,
                "Logout without a live refresh token"
            );
        }
        LogoutOutcome::Ignored(reason) => {
            tracing::info!(
                request_id = %context.request_id,
                operation = %context.operation,
                reason = %reason,
                "Logout token ignored"
            );
        }
        LogoutOutcome::Failed(e) => {
            tracing::warn!(
                request_id = %context.request_id,
                operation = %context.operation,
                error = %e,
                "Revocation failed during logout"
            );
        }
    }

    HttpResponse::Ok()
        .cookie(removal_cookie(&cookie_settings))
        .json(ApiResponse::message("Logged out"))
}

/// GET /me
///
/// **Requires valid JWT access token** in the Authorization header; claims
/// are injected by `JwtMiddleware`.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let user = accounts.get(user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::data(UserResponse::from(user))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::SameSite;

    fn settings() -> CookieSettings {
        CookieSettings {
            name: "refresh_token".to_string(),
            secure: true,
            same_site: "lax".to_string(),
            path: "/".to_string(),
        }
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie(&settings(), "abc", 604800);

        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(7)));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let cookie = removal_cookie(&settings());

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }
}
