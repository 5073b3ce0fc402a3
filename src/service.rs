use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::availability::{Availability, AvailabilityView};
use crate::config::ServiceConfig;
use crate::error::BookingError;
use crate::events::{BookingEvent, EventBus};
use crate::ledger::BookingLedger;
use crate::models::{
    Booking, BookingId, BookingRequest, BookingStatus, ConsultantId, DateRange, SlotGrid,
};
use crate::store::BookingStore;

/// Фасад бронирования - единственная поверхность для внешних коллабораторов
/// (API, UI, рассылка уведомлений). Ожидаемые бизнес-исходы возвращаются
/// значениями, паники здесь нет; сбои хранилища повторяются ограниченное
/// число раз и наружу выходят как `Unavailable`.
pub struct BookingService {
    ledger: Arc<BookingLedger>,
    availability: AvailabilityView,
    events: EventBus,
    config: ServiceConfig,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, config: ServiceConfig) -> Self {
        let ledger = Arc::new(BookingLedger::new(store, config.grid));
        let availability = AvailabilityView::new(
            Arc::clone(&ledger),
            Duration::from_secs(config.cache_ttl_secs),
        );
        let events = EventBus::new(config.event_capacity);

        BookingService {
            ledger,
            availability,
            events,
            config,
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        self.ledger.grid()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Подписка на события мутаций журнала.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Резервирует слот. Ровно один из конкурентных вызовов на один ключ
    /// выигрывает, остальные получают `SlotTaken` сразу, без очереди.
    pub async fn reserve(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let ttl = self.config.pending_ttl();
        let booking = self
            .with_retry(|| self.ledger.reserve(request.clone(), ttl))
            .await?;

        self.availability
            .invalidate(booking.consultant_id, booking.date)
            .await;
        self.events.publish(BookingEvent::Reserved {
            booking: booking.clone(),
        });

        log::info!(
            "booking {} reserved: consultant {}, {} {}",
            booking.id,
            booking.consultant_id,
            booking.date,
            booking.slot_label()
        );

        Ok(booking)
    }

    /// Переводит бронь в целевой статус по машине состояний.
    pub async fn advance(
        &self,
        id: &BookingId,
        target: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let change = self
            .with_retry(|| self.ledger.mutate_status(id, target))
            .await?;
        let booking = change.booking;

        self.availability
            .invalidate(booking.consultant_id, booking.date)
            .await;
        self.events.publish(BookingEvent::StatusChanged {
            booking: booking.clone(),
            from: change.previous,
        });

        log::info!(
            "booking {} advanced: {} -> {}",
            booking.id,
            change.previous,
            booking.status
        );

        Ok(booking)
    }

    /// Отмена - обычный переход `-> cancelled`, не отдельный протокол.
    pub async fn cancel(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.advance(id, BookingStatus::Cancelled).await
    }

    pub async fn get(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.with_retry(|| self.ledger.get(id)).await
    }

    /// Занятость за диапазон: слоты по датам и полностью занятые даты.
    pub async fn query_availability(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Availability, BookingError> {
        self.with_retry(|| self.availability.availability(consultant_id, range))
            .await
    }

    pub async fn booked_slots(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
    ) -> Result<BTreeSet<NaiveTime>, BookingError> {
        self.with_retry(|| self.availability.booked_slots_for(consultant_id, date))
            .await
    }

    pub async fn is_fully_booked(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
    ) -> Result<bool, BookingError> {
        self.with_retry(|| self.availability.is_fully_booked(consultant_id, date))
            .await
    }

    /// Отменяет просроченные `Pending`-брони. Возвращает число отмен.
    /// Каждая отмена идёт через обычный переход, с событием и сбросом кэша.
    pub async fn expire_overdue(&self, cutoff: DateTime<Utc>) -> Result<usize, BookingError> {
        let expired = self
            .with_retry(|| self.ledger.expired_pending(cutoff))
            .await?;

        let mut cancelled = 0;
        for booking in expired {
            match self.advance(&booking.id, BookingStatus::Cancelled).await {
                Ok(_) => {
                    cancelled += 1;
                    log::info!("booking {} expired and cancelled", booking.id);
                }
                // Бронь успели подтвердить или отменить параллельно
                Err(BookingError::IllegalTransition { .. }) => {
                    log::debug!("booking {} no longer pending, skipping expiry", booking.id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(cancelled)
    }

    /// Чистка протухших записей кэша доступности.
    pub async fn cleanup_cache(&self) {
        self.availability.cleanup().await;
    }

    /// Ограниченные повторы для сбоев хранилища; бизнес-ошибки не повторяются.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, BookingError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt >= self.config.store_retry_attempts {
                        log::error!("store unavailable after {} attempts: {}", attempt, e);
                        return Err(BookingError::Unavailable);
                    }
                    log::warn!("store error (attempt {}): {}", attempt, e);
                    tokio::time::sleep(Duration::from_millis(
                        self.config.store_retry_delay_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
