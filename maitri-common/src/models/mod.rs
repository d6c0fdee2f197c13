// File: maitri-common/src/models/mod.rs
pub mod case;
pub mod history;
pub mod session;
pub mod user;

pub use case::{Case, CaseStatus, Priority, RegistrationCode};
pub use history::{HistoryDetail, SessionHistory};
pub use session::{ProblemTag, Session, SessionStatus};
pub use user::{Actor, Client, Counselor, Role, Room, User};
