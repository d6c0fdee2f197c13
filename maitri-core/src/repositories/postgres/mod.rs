// src/repositories/postgres/mod.rs

pub mod cases;
pub mod clients;
pub mod registration_codes;
pub mod session_history;
pub mod sessions;

pub use cases::{CaseRepo, CaseRepository};
pub use clients::{ClientRepo, ClientRepository};
pub use registration_codes::{RegistrationCodeRepo, RegistrationCodeRepository};
pub use session_history::{SessionHistoryRepo, SessionHistoryRepository};
pub use sessions::{SessionRepo, SessionRepository};
