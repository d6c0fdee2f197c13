// src/services/mod.rs

pub mod booking_service;
pub mod case_service;
pub mod scheduling_service;
pub mod tokens;

pub use booking_service::{
    BookingConfirmation, BookingRequest, BookingService, BookingTarget, NoopNotifier, Notifier,
};
pub use case_service::{CaseService, ClinicalUpdate};
pub use scheduling_service::SchedulingService;
