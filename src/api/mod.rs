pub mod chat;
pub(crate) mod common;
pub mod engine;
pub mod health;
