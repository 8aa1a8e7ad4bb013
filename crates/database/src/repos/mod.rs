//! Repository implementations for data access

pub mod message_repository;
pub mod user_repository;

pub use message_repository::MessageRepository;
pub use user_repository::UserRepository;
