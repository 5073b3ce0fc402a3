use std::env;
use std::sync::Arc;

use consult_booking::{
    tasks, BookingService, BookingStore, Database, MemoryStore, PgBookingStore, ServiceConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Загружаем .env и инициализируем логирование
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting consultation booking service...");

    let config = ServiceConfig::from_env()?;
    log::info!(
        "Slot grid: {}-{} every {} min ({} slots), pending TTL {} min",
        config.grid.start().format("%H:%M"),
        config.grid.end().format("%H:%M"),
        config.grid.step_minutes(),
        config.grid.count(),
        config.pending_ttl_minutes
    );

    // Хранилище: Postgres при заданном DATABASE_URL, иначе память
    let store: Arc<dyn BookingStore> = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let db = Database::new(&database_url).await?;
            db.init().await?;
            log::info!("✅ Database initialized");
            Arc::new(PgBookingStore::new(db))
        }
        Err(_) => {
            log::warn!("DATABASE_URL is not set, falling back to in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let service = Arc::new(BookingService::new(store, config));

    // Фоновая задача для истечения неподтверждённых броней
    let service_clone = Arc::clone(&service);
    tokio::spawn(async move {
        tasks::run_expiry_sweeper(service_clone).await;
    });

    // Фоновая задача для очистки кэша
    let service_clone = Arc::clone(&service);
    tokio::spawn(async move {
        tasks::run_cache_cleanup(service_clone).await;
    });

    log::info!("🚀 Booking service is up");

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    Ok(())
}
