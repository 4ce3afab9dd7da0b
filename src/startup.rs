use actix_web::dev::Server;
use actix_web::middleware::{Logger, NormalizePath, TrailingSlash};
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::auth::{PasswordHasher, RevocationRegistry, SessionManager, SessionPolicy, TokenCodec};
use crate::configuration::{CookieSettings, Settings};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    create_user, delete_user, get_current_user, get_user, health_check, home, list_users, login,
    logout, refresh, register, update_user,
};
use crate::store::UserStore;

/// Shared services handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub accounts: Arc<AccountService>,
    pub cookie: CookieSettings,
}

impl AppState {
    /// Wire the services over the given stores.
    ///
    /// # Errors
    /// Fails on invalid settings, a short JWT secret or an out-of-range
    /// hash cost.
    pub fn new(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn RevocationRegistry>,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        let codec = TokenCodec::new(&settings.jwt)?;
        let hasher = PasswordHasher::new(settings.password.hash_cost)?;

        let sessions = SessionManager::new(
            users.clone(),
            revocations,
            codec,
            hasher.clone(),
            SessionPolicy::from(&settings.jwt),
        );
        let accounts = AccountService::new(users, hasher);

        Ok(Self {
            sessions: Arc::new(sessions),
            accounts: Arc::new(accounts),
            cookie: settings.cookie.clone(),
        })
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let sessions = web::Data::from(state.sessions);
    let accounts = web::Data::from(state.accounts);
    let cookie = web::Data::new(state.cookie);

    let server = HttpServer::new(move || {
        // Malformed or non-JSON bodies surface as the usual validation envelope
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            tracing::debug!(error = %err, "Rejected request body");
            AppError::from(ValidationError::InvalidFormat("request body".to_string())).into()
        });

        App::new()
            // Global middleware
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(LoggerMiddleware)
            .wrap(Logger::default())

            // Shared state
            .app_data(json_config)
            .app_data(sessions.clone())
            .app_data(accounts.clone())
            .app_data(cookie.clone())

            // Public routes
            .route("/", web::get().to(home))
            .route("/health_check", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout))
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(get_user))
                    .route(web::put().to(update_user))
                    .route(web::delete().to(delete_user)),
            )

            // Protected routes (require an access token)
            .service(
                web::scope("/me")
                    .wrap(JwtMiddleware::new(sessions.clone().into_inner()))
                    .route("", web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
