use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::BookingError;
use crate::ledger::BookingLedger;
use crate::models::{ConsultantId, DateRange};

type SlotCache =
    Arc<RwLock<HashMap<(ConsultantId, NaiveDate), (BTreeSet<NaiveTime>, SystemTime)>>>;

/// Ответ на запрос доступности за диапазон дат.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub booked_slots_by_date: BTreeMap<NaiveDate, BTreeSet<NaiveTime>>,
    pub fully_booked_dates: BTreeSet<NaiveDate>,
}

/// Производная картина занятости поверх журнала. Не источник истины:
/// пересчитывается по требованию, кэш сбрасывается при каждой мутации
/// журнала по затронутому ключу.
pub struct AvailabilityView {
    ledger: Arc<BookingLedger>,
    cache: SlotCache,
    cache_ttl: Duration,
}

impl AvailabilityView {
    pub fn new(ledger: Arc<BookingLedger>, cache_ttl: Duration) -> Self {
        AvailabilityView {
            ledger,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl,
        }
    }

    /// Занятые слоты консультанта на дату: активные брони, без терминальных.
    pub async fn booked_slots_for(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
    ) -> Result<BTreeSet<NaiveTime>, BookingError> {
        let started = Instant::now();
        let key = (consultant_id, date);

        {
            let cache = self.cache.read().await;
            if let Some((slots, stamp)) = cache.get(&key) {
                if stamp.elapsed().unwrap_or_default() < self.cache_ttl {
                    return Ok(slots.clone());
                }
            }
        }

        let slots = self.compute_booked_slots(consultant_id, date).await?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(key, (slots.clone(), SystemTime::now()));
        }

        log::debug!(
            "booked slots for consultant {} on {} computed in {:?}",
            consultant_id,
            date,
            started.elapsed()
        );

        Ok(slots)
    }

    /// Полная картина за диапазон одним проходом по журналу.
    /// Дата считается полностью занятой только при точном совпадении
    /// множества занятых слотов со всей сеткой.
    pub async fn availability(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Availability, BookingError> {
        let grid_slots: BTreeSet<NaiveTime> = self.ledger.grid().slots().into_iter().collect();

        let mut booked_slots_by_date: BTreeMap<NaiveDate, BTreeSet<NaiveTime>> = range
            .iter_days()
            .map(|date| (date, BTreeSet::new()))
            .collect();

        let bookings = self.ledger.list_by_consultant(consultant_id, range).await?;
        for booking in bookings {
            if !booking.status.holds_slot() {
                continue;
            }
            booked_slots_by_date
                .entry(booking.date)
                .or_default()
                .insert(booking.slot);
        }

        let fully_booked_dates = booked_slots_by_date
            .iter()
            .filter(|(_, slots)| **slots == grid_slots)
            .map(|(date, _)| *date)
            .collect();

        Ok(Availability {
            booked_slots_by_date,
            fully_booked_dates,
        })
    }

    pub async fn fully_booked_dates(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<BTreeSet<NaiveDate>, BookingError> {
        Ok(self
            .availability(consultant_id, range)
            .await?
            .fully_booked_dates)
    }

    pub async fn is_fully_booked(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
    ) -> Result<bool, BookingError> {
        let booked = self.booked_slots_for(consultant_id, date).await?;
        let grid_slots: BTreeSet<NaiveTime> = self.ledger.grid().slots().into_iter().collect();
        Ok(booked == grid_slots)
    }

    /// Сброс кэша по ключу мутации. Обязан вызываться на каждое успешное
    /// изменение журнала, иначе кэш отдаст устаревшую занятость.
    pub async fn invalidate(&self, consultant_id: ConsultantId, date: NaiveDate) {
        let mut cache = self.cache.write().await;
        cache.remove(&(consultant_id, date));
    }

    /// Периодическая чистка протухших записей.
    pub async fn cleanup(&self) {
        let mut cache = self.cache.write().await;
        let previous_count = cache.len();
        let ttl = self.cache_ttl;

        cache.retain(|_, (_, stamp)| stamp.elapsed().unwrap_or_default() < ttl);

        log::debug!(
            "availability cache cleaned: {} -> {} entries",
            previous_count,
            cache.len()
        );
    }

    async fn compute_booked_slots(
        &self,
        consultant_id: ConsultantId,
        date: NaiveDate,
    ) -> Result<BTreeSet<NaiveTime>, BookingError> {
        let bookings = self
            .ledger
            .list_by_consultant(consultant_id, DateRange::single(date))
            .await?;

        Ok(bookings
            .into_iter()
            .filter(|b| b.status.holds_slot())
            .map(|b| b.slot)
            .collect())
    }
}
