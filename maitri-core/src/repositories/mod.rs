// src/repositories/mod.rs

pub mod postgres;

pub use postgres::{
    CaseRepo, CaseRepository,
    ClientRepo, ClientRepository,
    RegistrationCodeRepo, RegistrationCodeRepository,
    SessionHistoryRepo, SessionHistoryRepository,
    SessionRepo, SessionRepository,
};
