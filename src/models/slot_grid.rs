use serde::{Serialize, Deserialize};
use chrono::{Duration, NaiveTime};

use crate::error::BookingError;

/// Сетка бронируемых слотов одного дня: окно `start..=end` с фиксированным
/// шагом. Чистое значение, общее для всех консультантов.
///
/// Обе границы входят в сетку, когда шаг попадает точно в `end`:
/// `09:00–18:00 / 30 мин` даёт 19 слотов `09:00, 09:30, …, 17:30, 18:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotGrid {
    start: NaiveTime,
    end: NaiveTime,
    step_minutes: u32,
}

impl SlotGrid {
    pub fn new(start: NaiveTime, end: NaiveTime, step_minutes: u32) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::Config(format!(
                "grid end {} must be after start {}",
                end.format("%H:%M"),
                start.format("%H:%M")
            )));
        }
        if step_minutes == 0 {
            return Err(BookingError::Config(
                "grid step must be at least one minute".to_string(),
            ));
        }
        Ok(SlotGrid {
            start,
            end,
            step_minutes,
        })
    }

    /// Сетка из строк вида "09:00" (конфигурация из окружения).
    pub fn parse(start: &str, end: &str, step_minutes: u32) -> Result<Self, BookingError> {
        let start = NaiveTime::parse_from_str(start, "%H:%M")
            .map_err(|e| BookingError::Config(format!("invalid grid start '{}': {}", start, e)))?;
        let end = NaiveTime::parse_from_str(end, "%H:%M")
            .map_err(|e| BookingError::Config(format!("invalid grid end '{}': {}", end, e)))?;
        SlotGrid::new(start, end, step_minutes)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    /// Упорядоченный список слотов дня.
    pub fn slots(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(self.step_minutes as i64);
        let mut out = Vec::with_capacity(self.count());
        let mut current = self.start;
        while current <= self.end {
            out.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }
        out
    }

    pub fn labels(&self) -> Vec<String> {
        self.slots()
            .into_iter()
            .map(|slot| slot.format("%H:%M").to_string())
            .collect()
    }

    pub fn count(&self) -> usize {
        let window = (self.end - self.start).num_minutes() as u32;
        (window / self.step_minutes) as usize + 1
    }

    pub fn contains(&self, slot: NaiveTime) -> bool {
        if slot < self.start || slot > self.end {
            return false;
        }
        let offset = (slot - self.start).num_seconds();
        offset % (self.step_minutes as i64 * 60) == 0
    }
}

impl Default for SlotGrid {
    /// Рабочее окно по умолчанию: 09:00–18:00 с шагом 30 минут.
    fn default() -> Self {
        SlotGrid {
            start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid default grid start"),
            end: NaiveTime::from_hms_opt(18, 0, 0).expect("valid default grid end"),
            step_minutes: 30,
        }
    }
}
