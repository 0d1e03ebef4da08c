use dotenvy::dotenv;
use order_core::config::AppConfig;
use order_core::{build_server, create_pool, diesel_services, in_memory_services, run_migrations};
use tokio_util::sync::CancellationToken;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let services = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.db_pool_size, config.db_connect_timeout)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e))?;
            run_migrations(&pool).map_err(std::io::Error::other)?;
            diesel_services(pool, config.core)
        }
        None => {
            log::warn!("DATABASE_URL is not set, orders and products are kept in memory only");
            in_memory_services(config.core)
        }
    };

    let shutdown = CancellationToken::new();
    let scheduler = services.scheduler.clone().start(shutdown.clone());

    log::info!("Starting server at http://{}:{}", config.host, config.port);
    let result = build_server(services, &config.host, config.port)?.await;

    scheduler.stop().await;
    result
}
