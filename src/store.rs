use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::RwLock;

use crate::error::BookingError;
use crate::models::{Booking, BookingId, BookingStatus, ConsultantId, DateRange};

/// Хранилище броней. Внедряется в журнал: в тестах - память,
/// в продакшене - Postgres.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Атомарная запись: либо слот свободен и бронь сохранена, либо
    /// `SlotTaken`. Две одновременные попытки на один ключ дают ровно
    /// один успех.
    async fn insert_if_free(&self, booking: Booking) -> Result<Booking, BookingError>;

    async fn get(&self, id: &BookingId) -> Result<Booking, BookingError>;

    /// Брони консультанта за диапазон дат, по возрастанию (дата, слот).
    async fn list_by_consultant(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Vec<Booking>, BookingError>;

    /// Сохраняет обновлённую бронь, только если статус в хранилище всё ещё
    /// равен `expected`. `Ok(false)` - запись ушла вперёд, нужно перечитать.
    async fn update_if_status(
        &self,
        updated: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError>;

    /// Просроченные `Pending`-брони с дедлайном не позже `cutoff`.
    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;
}

type SlotKey = (ConsultantId, NaiveDate, NaiveTime);

#[derive(Default)]
struct MemoryInner {
    bookings: HashMap<BookingId, Booking>,
    // Индекс активных броней; терминальные статусы ключ не держат
    slots: HashMap<SlotKey, BookingId>,
}

/// Хранилище в памяти. Один замок на всё состояние: проверка занятости и
/// запись выполняются под одним write-захватом, это и даёт атомарность
/// резервирования.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_if_free(&self, booking: Booking) -> Result<Booking, BookingError> {
        let mut inner = self.inner.write().await;

        let key = booking.slot_key();
        if inner.slots.contains_key(&key) {
            return Err(BookingError::SlotTaken);
        }

        inner.slots.insert(key, booking.id.clone());
        inner.bookings.insert(booking.id.clone(), booking.clone());

        log::debug!(
            "booking {} stored for consultant {} at {} {}",
            booking.id,
            booking.consultant_id,
            booking.date,
            booking.slot_label()
        );

        Ok(booking)
    }

    async fn get(&self, id: &BookingId) -> Result<Booking, BookingError> {
        let inner = self.inner.read().await;
        inner
            .bookings
            .get(id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(id.clone()))
    }

    async fn list_by_consultant(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Vec<Booking>, BookingError> {
        let inner = self.inner.read().await;
        let mut out: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.consultant_id == consultant_id && range.contains(b.date))
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.date, b.slot));
        Ok(out)
    }

    async fn update_if_status(
        &self,
        updated: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let mut inner = self.inner.write().await;

        let current = inner
            .bookings
            .get(&updated.id)
            .ok_or_else(|| BookingError::NotFound(updated.id.clone()))?;
        if current.status != expected {
            return Ok(false);
        }

        if !updated.status.holds_slot() {
            inner.slots.remove(&updated.slot_key());
        }
        inner.bookings.insert(updated.id.clone(), updated.clone());
        Ok(true)
    }

    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let inner = self.inner.read().await;
        let mut out: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Pending
                    && b.expires_at.map_or(false, |deadline| deadline <= cutoff)
            })
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.date, b.slot));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingRequest, ClientId, MeetingType, ServiceId};

    fn request(consultant: i64, hour: u32, minute: u32) -> BookingRequest {
        BookingRequest {
            client_id: ClientId(1),
            consultant_id: ConsultantId(consultant),
            service_id: ServiceId(1),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            slot: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            duration_minutes: 30,
            price: 20.0,
            currency: "USD".to_string(),
            meeting_type: MeetingType::Video,
            notes: None,
        }
    }

    #[tokio::test]
    async fn second_insert_for_the_same_slot_is_rejected() {
        let store = MemoryStore::new();

        store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap();
        let err = store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::SlotTaken);

        // Другой консультант со своим ключом не конфликтует
        store
            .insert_if_free(Booking::from_request(request(43, 10, 0), None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn terminal_update_releases_the_slot() {
        let store = MemoryStore::new();
        let booking = store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap();

        let cancelled = booking.transition(BookingStatus::Cancelled).unwrap();
        assert!(store
            .update_if_status(&cancelled, BookingStatus::Pending)
            .await
            .unwrap());

        // Слот снова свободен, а отменённая запись осталась в истории
        store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap();
        assert_eq!(
            store.get(&booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn stale_status_update_is_refused() {
        let store = MemoryStore::new();
        let booking = store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap();

        let confirmed = booking.transition(BookingStatus::Confirmed).unwrap();
        assert!(store
            .update_if_status(&confirmed, BookingStatus::Pending)
            .await
            .unwrap());

        // Повторная попытка от старого снимка проигрывает CAS
        let cancelled = booking.transition(BookingStatus::Cancelled).unwrap();
        assert!(!store
            .update_if_status(&cancelled, BookingStatus::Pending)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn listing_filters_by_consultant_and_range() {
        let store = MemoryStore::new();
        store
            .insert_if_free(Booking::from_request(request(42, 10, 0), None))
            .await
            .unwrap();
        store
            .insert_if_free(Booking::from_request(request(42, 9, 0), None))
            .await
            .unwrap();
        store
            .insert_if_free(Booking::from_request(request(99, 10, 0), None))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let listed = store
            .list_by_consultant(ConsultantId(42), DateRange::single(date))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        // Отсортировано по времени слота
        assert!(listed[0].slot < listed[1].slot);

        let empty = store
            .list_by_consultant(
                ConsultantId(42),
                DateRange::single(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()),
            )
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn expired_pending_listing_honors_the_cutoff() {
        let store = MemoryStore::new();
        let deadline = Utc::now() + chrono::Duration::minutes(30);
        let booking = store
            .insert_if_free(Booking::from_request(request(42, 10, 0), Some(deadline)))
            .await
            .unwrap();
        store
            .insert_if_free(Booking::from_request(request(42, 11, 0), None))
            .await
            .unwrap();

        let due_now = store.list_expired_pending(Utc::now()).await.unwrap();
        assert!(due_now.is_empty());

        let due_later = store
            .list_expired_pending(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(due_later.len(), 1);
        assert_eq!(due_later[0].id, booking.id);
    }
}
