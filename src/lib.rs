pub mod backup;
pub mod config;
pub mod cron;
pub mod error;
pub mod logger;
pub mod mail;
pub mod scheduler;
