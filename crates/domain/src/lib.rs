pub mod activity;
pub mod activity_repository;
pub mod activity_service;
pub mod alerts;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod messages;
pub mod ports;
pub mod search;
pub mod store;
pub mod users;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
