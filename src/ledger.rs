use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::BookingError;
use crate::models::{
    Booking, BookingId, BookingRequest, BookingStatus, ConsultantId, DateRange, SlotGrid,
};
use crate::store::BookingStore;

/// Результат перехода статуса: обновлённая бронь и статус, из которого ушли.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub booking: Booking,
    pub previous: BookingStatus,
}

/// Журнал броней - единственный компонент, который создаёт и меняет записи.
/// Атомарность резервирования делегируется хранилищу.
pub struct BookingLedger {
    store: Arc<dyn BookingStore>,
    grid: SlotGrid,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn BookingStore>, grid: SlotGrid) -> Self {
        BookingLedger { store, grid }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    /// Резервирует слот. Слот вне сетки - ошибка конфигурации вызова,
    /// занятый слот - `SlotTaken` без ожидания.
    pub async fn reserve(
        &self,
        request: BookingRequest,
        pending_ttl: Option<Duration>,
    ) -> Result<Booking, BookingError> {
        if !self.grid.contains(request.slot) {
            return Err(BookingError::Config(format!(
                "slot {} is outside the booking grid {}-{}",
                request.slot.format("%H:%M"),
                self.grid.start().format("%H:%M"),
                self.grid.end().format("%H:%M"),
            )));
        }

        let expires_at = pending_ttl.map(|ttl| Utc::now() + ttl);
        let booking = Booking::from_request(request, expires_at);
        self.store.insert_if_free(booking).await
    }

    pub async fn get(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.store.get(id).await
    }

    pub async fn list_by_consultant(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Vec<Booking>, BookingError> {
        self.store.list_by_consultant(consultant_id, range).await
    }

    /// Переводит бронь в новый статус. Легальность перехода проверяется от
    /// текущего состояния, запись - через CAS по ожидаемому статусу; при
    /// проигранной гонке состояние перечитывается и проверяется заново.
    /// Инвариант эксклюзивности здесь не перепроверяется: терминальный статус
    /// освобождает слот сам по себе.
    pub async fn mutate_status(
        &self,
        id: &BookingId,
        target: BookingStatus,
    ) -> Result<StatusChange, BookingError> {
        loop {
            let current = self.store.get(id).await?;
            let updated = current.transition(target)?;

            if self
                .store
                .update_if_status(&updated, current.status)
                .await?
            {
                return Ok(StatusChange {
                    booking: updated,
                    previous: current.status,
                });
            }

            // Параллельный переход успел раньше; статусы движутся только к
            // терминальным, так что цикл конечен
            log::debug!("status race on booking {}, re-reading", id);
        }
    }

    /// Просроченные `Pending`-брони для фоновой отмены.
    pub async fn expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        self.store.list_expired_pending(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientId, MeetingType, ServiceId};
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};

    fn ledger() -> BookingLedger {
        BookingLedger::new(Arc::new(MemoryStore::new()), SlotGrid::default())
    }

    fn request(hour: u32, minute: u32) -> BookingRequest {
        BookingRequest {
            client_id: ClientId(7),
            consultant_id: ConsultantId(42),
            service_id: ServiceId(1),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            slot: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            duration_minutes: 30,
            price: 25.0,
            currency: "USD".to_string(),
            meeting_type: MeetingType::Video,
            notes: None,
        }
    }

    #[tokio::test]
    async fn reserve_rejects_slots_outside_the_grid() {
        let ledger = ledger();
        let err = ledger.reserve(request(8, 0), None).await.unwrap_err();
        assert!(matches!(err, BookingError::Config(_)));

        let err = ledger.reserve(request(10, 17), None).await.unwrap_err();
        assert!(matches!(err, BookingError::Config(_)));
    }

    #[tokio::test]
    async fn reserve_applies_the_pending_ttl() {
        let ledger = ledger();
        let booking = ledger
            .reserve(request(10, 0), Some(Duration::minutes(30)))
            .await
            .unwrap();
        assert!(booking.expires_at.is_some());

        let no_ttl = ledger.reserve(request(10, 30), None).await.unwrap();
        assert!(no_ttl.expires_at.is_none());
    }

    #[tokio::test]
    async fn mutate_status_walks_the_state_machine() {
        let ledger = ledger();
        let booking = ledger.reserve(request(10, 0), None).await.unwrap();

        let change = ledger
            .mutate_status(&booking.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(change.previous, BookingStatus::Pending);
        assert_eq!(change.booking.status, BookingStatus::Confirmed);

        let err = ledger
            .mutate_status(&booking.id, BookingStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::IllegalTransition {
                from: BookingStatus::Confirmed,
                to: BookingStatus::Completed,
            }
        );
    }

    #[tokio::test]
    async fn mutate_status_of_unknown_booking_is_not_found() {
        let ledger = ledger();
        let id = BookingId::new();
        let err = ledger
            .mutate_status(&id, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::NotFound(id));
    }
}
