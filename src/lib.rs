pub mod application;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::{AppServices, CoreSettings};
use clock::SystemClock;
use infrastructure::catalog_repo::DieselCatalogStore;
use infrastructure::memory::{InMemoryCatalog, InMemoryLedger};
use infrastructure::order_repo::DieselOrderLedger;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    log::info!("Applied {} pending migration(s)", applied.len());
    Ok(())
}

/// Services backed by Postgres.
pub fn diesel_services(pool: DbPool, settings: CoreSettings) -> AppServices {
    AppServices::new(
        Arc::new(DieselCatalogStore::new(pool.clone())),
        Arc::new(DieselOrderLedger::new(pool)),
        Arc::new(SystemClock),
        settings,
    )
}

/// Services backed by process memory. Nothing survives a restart.
pub fn in_memory_services(settings: CoreSettings) -> AppServices {
    AppServices::new(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(InMemoryLedger::new()),
        Arc::new(SystemClock),
        settings,
    )
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    services: AppServices,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = handlers::ApiDoc::openapi();

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(services.clone()))
            .wrap(Logger::default())
            .configure(handlers::configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
