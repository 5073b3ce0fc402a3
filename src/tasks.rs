use std::sync::Arc;

use chrono::Utc;
use tokio::time;

use crate::service::BookingService;

/// Фоновая задача: отменяет просроченные неподтверждённые брони.
pub async fn run_expiry_sweeper(service: Arc<BookingService>) {
    let interval_secs = service.config().sweep_interval_secs;
    let mut interval = time::interval(time::Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match service.expire_overdue(Utc::now()).await {
            Ok(0) => {}
            Ok(count) => log::info!("⏰ Cancelled {} expired pending bookings", count),
            Err(e) => log::error!("Error expiring pending bookings: {}", e),
        }
    }
}

/// Фоновая задача: периодическая чистка кэша доступности.
pub async fn run_cache_cleanup(service: Arc<BookingService>) {
    let mut interval = time::interval(time::Duration::from_secs(600));

    loop {
        interval.tick().await;
        service.cleanup_cache().await;
    }
}
