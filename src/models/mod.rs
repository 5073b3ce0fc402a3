pub mod booking;
pub mod slot_grid;

pub use booking::{
    Booking, BookingId, BookingRequest, BookingStatus, ClientId, ConsultantId, DateRange,
    MeetingType, ServiceId,
};
pub use slot_grid::SlotGrid;
