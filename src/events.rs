use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Booking, BookingStatus};

/// Событие мутации журнала. Потребители (рассылка уведомлений, аналитика,
/// чат-интеграция) подписываются через `subscribe`; ядро не зависит от их
/// успеха и никого не ждёт.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingEvent {
    Reserved {
        booking: Booking,
    },
    StatusChanged {
        booking: Booking,
        from: BookingStatus,
    },
}

impl BookingEvent {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingEvent::Reserved { booking } => booking,
            BookingEvent::StatusChanged { booking, .. } => booking,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BookingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: BookingEvent) {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "booking event: {}",
                serde_json::to_string(&event).unwrap_or_default()
            );
        }

        // Отсутствие подписчиков - не ошибка
        if self.tx.send(event).is_err() {
            log::debug!("booking event dropped: no subscribers");
        }
    }
}
