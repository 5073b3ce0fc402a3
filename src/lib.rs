pub mod availability;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod service;
pub mod store;
pub mod tasks;

pub use availability::{Availability, AvailabilityView};
pub use config::ServiceConfig;
pub use database::{Database, PgBookingStore};
pub use error::BookingError;
pub use events::{BookingEvent, EventBus};
pub use ledger::{BookingLedger, StatusChange};
pub use models::{
    Booking, BookingId, BookingRequest, BookingStatus, ClientId, ConsultantId, DateRange,
    MeetingType, ServiceId, SlotGrid,
};
pub use service::BookingService;
pub use store::{BookingStore, MemoryStore};
