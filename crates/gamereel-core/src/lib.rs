pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod facade;
pub mod job_store;
pub mod keys;
pub mod media;
pub mod progress;
pub mod resources;
pub mod retry;
pub mod safe_resume;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod transfer;
pub mod transfer_db;
