use serde::{Serialize, Deserialize};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::error::BookingError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn new() -> Self {
        BookingId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsultantId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub i32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ConsultantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Статус брони. Переходы разрешены только по таблице в `can_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "in_progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "no_show" => Some(BookingStatus::NoShow),
            _ => None,
        }
    }

    /// Терминальный статус: дальнейшие переходы запрещены, слот освобождён.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// Держит ли бронь с этим статусом слот (инвариант эксклюзивности).
    pub fn holds_slot(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, NoShow)
                | (InProgress, Completed)
        )
    }

    pub fn all() -> [BookingStatus; 6] {
        use BookingStatus::*;
        [Pending, Confirmed, InProgress, Completed, Cancelled, NoShow]
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Video,
    Phone,
    InPerson,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::Video => "video",
            MeetingType::Phone => "phone",
            MeetingType::InPerson => "in_person",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(MeetingType::Video),
            "phone" => Some(MeetingType::Phone),
            "in_person" => Some(MeetingType::InPerson),
            _ => None,
        }
    }
}

impl Default for MeetingType {
    fn default() -> Self {
        MeetingType::Video
    }
}

/// Диапазон дат, обе границы включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, BookingError> {
        if to < from {
            return Err(BookingError::Config(format!(
                "invalid date range: {} is after {}",
                from, to
            )));
        }
        Ok(DateRange { from, to })
    }

    pub fn single(date: NaiveDate) -> Self {
        DateRange { from: date, to: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        std::iter::successors(Some(self.from), move |d| {
            d.succ_opt().filter(|next| *next <= to)
        })
    }
}

/// Заявка на бронирование. Ссылочные идентификаторы не проверяются на
/// существование, этим владеют другие подсистемы.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub client_id: ClientId,
    pub consultant_id: ConsultantId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub slot: NaiveTime,
    pub duration_minutes: u32,
    pub price: f64,
    pub currency: String,
    pub meeting_type: MeetingType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub client_id: ClientId,
    pub consultant_id: ConsultantId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub slot: NaiveTime,
    pub status: BookingStatus,
    pub duration_minutes: u32,
    pub price: f64,
    pub currency: String,
    pub meeting_type: MeetingType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Новая бронь из заявки. Статус всегда `Pending`: слот уже удерживается,
    /// но подтверждение остаётся отдельным шагом.
    pub fn from_request(request: BookingRequest, expires_at: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            client_id: request.client_id,
            consultant_id: request.consultant_id,
            service_id: request.service_id,
            date: request.date,
            slot: request.slot,
            status: BookingStatus::Pending,
            duration_minutes: request.duration_minutes,
            price: request.price,
            currency: request.currency,
            meeting_type: request.meeting_type,
            notes: request.notes,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            completed_at: None,
            expires_at,
        }
    }

    pub fn slot_label(&self) -> String {
        self.slot.format("%H:%M").to_string()
    }

    /// Ключ эксклюзивности: на один `(консультант, дата, слот)` не больше
    /// одной активной брони.
    pub fn slot_key(&self) -> (ConsultantId, NaiveDate, NaiveTime) {
        (self.consultant_id, self.date, self.slot)
    }

    /// Переход по машине состояний. Нелегальное ребро - `IllegalTransition`.
    pub fn transition(&self, to: BookingStatus) -> Result<Booking, BookingError> {
        if !self.status.can_transition(to) {
            return Err(BookingError::IllegalTransition {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        let mut next = self.clone();
        next.status = to;
        next.updated_at = now;

        match to {
            BookingStatus::Confirmed => {
                // Подтверждённая бронь больше не истекает
                next.expires_at = None;
            }
            BookingStatus::Cancelled | BookingStatus::NoShow => {
                next.cancelled_at = Some(now);
            }
            BookingStatus::Completed => {
                next.completed_at = Some(now);
            }
            _ => {}
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            client_id: ClientId(7),
            consultant_id: ConsultantId(42),
            service_id: ServiceId(1),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            slot: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_minutes: 30,
            price: 25.0,
            currency: "USD".to_string(),
            meeting_type: MeetingType::Video,
            notes: None,
        }
    }

    #[test]
    fn new_booking_is_pending() {
        let booking = Booking::from_request(request(), None);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.status.holds_slot());
        assert!(booking.cancelled_at.is_none());
        assert!(booking.completed_at.is_none());
    }

    #[test]
    fn allowed_edges_match_the_table() {
        use BookingStatus::*;
        let allowed = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Cancelled),
            (Confirmed, InProgress),
            (Confirmed, NoShow),
            (InProgress, Completed),
        ];

        for from in BookingStatus::all() {
            for to in BookingStatus::all() {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "transition {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn illegal_transition_is_rejected_with_both_states() {
        let booking = Booking::from_request(request(), None);
        let err = booking.transition(BookingStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            BookingError::IllegalTransition {
                from: BookingStatus::Pending,
                to: BookingStatus::Completed,
            }
        );
    }

    #[test]
    fn terminal_statuses_accept_no_further_transition() {
        let booking = Booking::from_request(request(), None);
        let cancelled = booking.transition(BookingStatus::Cancelled).unwrap();
        assert!(cancelled.status.is_terminal());
        assert!(!cancelled.status.holds_slot());

        for target in BookingStatus::all() {
            assert!(
                cancelled.transition(target).is_err(),
                "cancelled -> {} must be rejected",
                target
            );
        }
    }

    #[test]
    fn cancellation_and_completion_stamp_audit_fields() {
        let booking = Booking::from_request(request(), None);

        let cancelled = booking.transition(BookingStatus::Cancelled).unwrap();
        assert!(cancelled.cancelled_at.is_some());

        let completed = booking
            .transition(BookingStatus::Confirmed)
            .unwrap()
            .transition(BookingStatus::InProgress)
            .unwrap()
            .transition(BookingStatus::Completed)
            .unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn confirmation_clears_the_expiry_deadline() {
        let expires = Utc::now() + chrono::Duration::minutes(30);
        let booking = Booking::from_request(request(), Some(expires));
        assert!(booking.expires_at.is_some());

        let confirmed = booking.transition(BookingStatus::Confirmed).unwrap();
        assert!(confirmed.expires_at.is_none());
    }

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in BookingStatus::all() {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("paid"), None);
    }

    #[test]
    fn date_range_iterates_inclusive_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
        )
        .unwrap();
        let days: Vec<_> = range.iter_days().collect();
        assert_eq!(days.len(), 3);
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()));

        assert!(DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .is_err());
    }
}
