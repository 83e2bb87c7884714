//! SamudraIO - Sonar record stream reader and MB1 sounding relay
//!
//! This library reads the framed record stream of a multibeam sonar
//! processor, keeps the connection subscribed, and relays processed
//! soundings to UDP subscribers as MB1 packets.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame_buffer;
pub mod protocol;
pub mod reader;
pub mod stats;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
