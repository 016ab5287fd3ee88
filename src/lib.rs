pub mod config;
pub mod error;
pub mod version;

pub mod extract;
pub mod notifications;
pub mod portal;

pub mod monitor;
