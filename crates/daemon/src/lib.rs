#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod moodle;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod telegram;
pub mod transfer;
pub mod workflow;
