use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::error::BookingError;
use crate::models::{
    Booking, BookingId, BookingStatus, ClientId, ConsultantId, DateRange, MeetingType, ServiceId,
};
use crate::store::BookingStore;

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, BookingError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn init(&self) -> Result<(), BookingError> {
        // Таблица bookings: одна строка на бронь, записи не удаляются
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                client_id BIGINT NOT NULL,
                consultant_id BIGINT NOT NULL,
                service_id INTEGER NOT NULL,
                date DATE NOT NULL,
                slot TIME NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                duration_minutes INTEGER NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                currency TEXT NOT NULL,
                meeting_type TEXT NOT NULL,
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                cancelled_at TIMESTAMP WITH TIME ZONE,
                completed_at TIMESTAMP WITH TIME ZONE,
                expires_at TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Частичный уникальный индекс - инвариант эксклюзивности слота.
        // Терминальные статусы в индекс не входят и слот не держат.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_active_slot
            ON bookings (consultant_id, date, slot)
            WHERE status IN ('pending', 'confirmed', 'in_progress')
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bookings_consultant_date ON bookings (consultant_id, date)"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings (status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_expires_at ON bookings (expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Postgres-хранилище броней поверх общего пула.
#[derive(Clone)]
pub struct PgBookingStore {
    db: Database,
}

impl PgBookingStore {
    pub fn new(db: Database) -> Self {
        PgBookingStore { db }
    }
}

const BOOKING_COLUMNS: &str = "id, client_id, consultant_id, service_id, date, slot, status, \
     duration_minutes, price, currency, meeting_type, notes, \
     created_at, updated_at, cancelled_at, completed_at, expires_at";

fn booking_from_row(row: &PgRow) -> Result<Booking, BookingError> {
    let status_raw: String = row.get("status");
    let status = BookingStatus::parse(&status_raw)
        .ok_or_else(|| BookingError::Store(format!("unknown booking status '{}'", status_raw)))?;

    let meeting_raw: String = row.get("meeting_type");
    let meeting_type = MeetingType::parse(&meeting_raw)
        .ok_or_else(|| BookingError::Store(format!("unknown meeting type '{}'", meeting_raw)))?;

    Ok(Booking {
        id: BookingId(row.get("id")),
        client_id: ClientId(row.get("client_id")),
        consultant_id: ConsultantId(row.get("consultant_id")),
        service_id: ServiceId(row.get("service_id")),
        date: row.get("date"),
        slot: row.get("slot"),
        status,
        duration_minutes: row.get::<i32, _>("duration_minutes") as u32,
        price: row.get("price"),
        currency: row.get("currency"),
        meeting_type,
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        cancelled_at: row.get("cancelled_at"),
        completed_at: row.get("completed_at"),
        expires_at: row.get("expires_at"),
    })
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_if_free(&self, booking: Booking) -> Result<Booking, BookingError> {
        // Конфликт по частичному индексу - слот занят активной бронью
        let result = sqlx::query(
            r#"
            INSERT INTO bookings
                (id, client_id, consultant_id, service_id, date, slot, status,
                 duration_minutes, price, currency, meeting_type, notes,
                 created_at, updated_at, cancelled_at, completed_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (consultant_id, date, slot)
                WHERE status IN ('pending', 'confirmed', 'in_progress')
                DO NOTHING
            "#,
        )
        .bind(booking.id.as_str())
        .bind(booking.client_id.0)
        .bind(booking.consultant_id.0)
        .bind(booking.service_id.0)
        .bind(booking.date)
        .bind(booking.slot)
        .bind(booking.status.as_str())
        .bind(booking.duration_minutes as i32)
        .bind(booking.price)
        .bind(&booking.currency)
        .bind(booking.meeting_type.as_str())
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.cancelled_at)
        .bind(booking.completed_at)
        .bind(booking.expires_at)
        .execute(&self.db.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BookingError::SlotTaken);
        }

        Ok(booking)
    }

    async fn get(&self, id: &BookingId) -> Result<Booking, BookingError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.db.pool)
        .await?;

        match row {
            Some(row) => booking_from_row(&row),
            None => Err(BookingError::NotFound(id.clone())),
        }
    }

    async fn list_by_consultant(
        &self,
        consultant_id: ConsultantId,
        range: DateRange,
    ) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings \
             WHERE consultant_id = $1 AND date BETWEEN $2 AND $3 \
             ORDER BY date ASC, slot ASC",
            BOOKING_COLUMNS
        ))
        .bind(consultant_id.0)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.db.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn update_if_status(
        &self,
        updated: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, updated_at = $2, cancelled_at = $3,
                completed_at = $4, expires_at = $5
            WHERE id = $6 AND status = $7
            "#,
        )
        .bind(updated.status.as_str())
        .bind(updated.updated_at)
        .bind(updated.cancelled_at)
        .bind(updated.completed_at)
        .bind(updated.expires_at)
        .bind(updated.id.as_str())
        .bind(expected.as_str())
        .execute(&self.db.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Ноль строк: либо записи нет, либо статус ушёл вперёд
        self.get(&updated.id).await?;
        Ok(false)
    }

    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings \
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at ASC",
            BOOKING_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.db.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }
}
