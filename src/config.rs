use std::env;

use crate::error::BookingError;
use crate::models::SlotGrid;

/// Настройки сервиса бронирования, собираются из окружения.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub grid: SlotGrid,
    /// Срок жизни неподтверждённой брони в минутах, 0 отключает истечение.
    pub pending_ttl_minutes: u32,
    pub cache_ttl_secs: u64,
    pub store_retry_attempts: u32,
    pub store_retry_delay_ms: u64,
    pub event_capacity: usize,
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            grid: SlotGrid::default(),
            pending_ttl_minutes: 30,
            cache_ttl_secs: 300,
            store_retry_attempts: 3,
            store_retry_delay_ms: 200,
            event_capacity: 64,
            sweep_interval_secs: 60,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BookingError> {
        let defaults = ServiceConfig::default();

        let grid_start = env::var("GRID_START").unwrap_or_else(|_| "09:00".to_string());
        let grid_end = env::var("GRID_END").unwrap_or_else(|_| "18:00".to_string());
        let grid_step = parse_env("GRID_STEP_MINUTES", 30u32)?;
        let grid = SlotGrid::parse(&grid_start, &grid_end, grid_step)?;

        Ok(ServiceConfig {
            grid,
            pending_ttl_minutes: parse_env("PENDING_TTL_MINUTES", defaults.pending_ttl_minutes)?,
            cache_ttl_secs: parse_env("AVAILABILITY_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            store_retry_attempts: parse_env("STORE_RETRY_ATTEMPTS", defaults.store_retry_attempts)?,
            store_retry_delay_ms: parse_env("STORE_RETRY_DELAY_MS", defaults.store_retry_delay_ms)?,
            event_capacity: parse_env("EVENT_CAPACITY", defaults.event_capacity)?,
            sweep_interval_secs: parse_env("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
        })
    }

    /// TTL как `chrono::Duration`; `None` - брони не истекают.
    pub fn pending_ttl(&self) -> Option<chrono::Duration> {
        if self.pending_ttl_minutes == 0 {
            None
        } else {
            Some(chrono::Duration::minutes(self.pending_ttl_minutes as i64))
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, BookingError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| BookingError::Config(format!("invalid {}='{}': {}", name, raw, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_default_grid() {
        let config = ServiceConfig::default();
        assert_eq!(config.grid.count(), 19);
        assert_eq!(config.pending_ttl_minutes, 30);
        assert!(config.pending_ttl().is_some());
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let config = ServiceConfig {
            pending_ttl_minutes: 0,
            ..ServiceConfig::default()
        };
        assert!(config.pending_ttl().is_none());
    }
}
