use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AccessTokenIssuer, CredentialVerifier, PasswordHasher, RefreshTokenStore, SessionService};
use crate::clock::Clock;
use crate::configuration::Settings;
use crate::database::{RefreshTokenRepository, UserRepository};
use crate::error::AppError;
use crate::logger::RequestLogger;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    current_user, health_check, login, logout, refresh, register, reset_password, revoke,
    update_profile,
};
use crate::users::UserService;

/// The services request handlers share, wired once per process.
#[derive(Clone)]
pub struct AppServices {
    pub sessions: SessionService,
    pub users: UserService,
}

impl AppServices {
    /// Wire the services over one store. `store` backs both repositories.
    ///
    /// # Errors
    /// `AppError::Config` if `settings` fail validation.
    pub fn build<R>(settings: &Settings, store: Arc<R>, clock: Arc<dyn Clock>) -> Result<Self, AppError>
    where
        R: UserRepository + RefreshTokenRepository + 'static,
    {
        settings.validate()?;
        let hasher = PasswordHasher::new(settings.session.password_hash_cost)?;
        let issuer = AccessTokenIssuer::new(settings.jwt.clone(), clock.clone());
        let refresh_tokens = RefreshTokenStore::new(
            store.clone(),
            clock.clone(),
            settings.jwt.refresh_token_expiry,
        );

        let sessions = SessionService::new(
            CredentialVerifier::new(store.clone(), hasher.clone()),
            issuer,
            refresh_tokens.clone(),
        );
        let users = UserService::new(store, hasher, refresh_tokens, clock);

        Ok(Self { sessions, users })
    }
}

pub fn run(listener: TcpListener, services: AppServices) -> Result<Server, std::io::Error> {
    let issuer = services.sessions.issuer().clone();
    let sessions = web::Data::new(services.sessions);
    let users = web::Data::new(services.users);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(RequestLogger)
            .app_data(sessions.clone())
            .app_data(users.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/users", web::post().to(register))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/revoke", web::post().to(revoke))
                    .service(
                        web::resource("/logout")
                            .wrap(JwtMiddleware::new(issuer.clone()))
                            .route(web::post().to(logout)),
                    ),
            )
            // Protected routes (require a valid access token)
            .service(
                web::scope("/users/me")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route("", web::get().to(current_user))
                    .route("", web::put().to(update_profile))
                    .route("/password", web::put().to(reset_password)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically delete refresh tokens that stopped mattering long ago.
pub async fn run_refresh_token_cleanup(
    refresh_tokens: RefreshTokenStore,
    interval_seconds: u64,
    retention_seconds: i64,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
    let retention = Duration::seconds(retention_seconds);

    loop {
        interval.tick().await;
        if let Err(e) = refresh_tokens.cleanup(retention).await {
            tracing::error!(error = %e, "Refresh token cleanup failed");
        }
    }
}
