//! # Serial Capture Library
//!
//! Capture text from a serial port and UDP sockets into a timestamped log
//! file, and binary UDP telemetry into a SQLite database.
//!
//! Every source is polled from one cooperative loop (see [`scheduler`]), so
//! a quiet or disconnected source never holds up the others.

pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod logfile;
pub mod scheduler;
pub mod source;
pub mod telemetry;
