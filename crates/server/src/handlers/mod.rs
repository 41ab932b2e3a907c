//! HTTP request handlers.

pub mod health;
pub mod uploads;

pub use health::*;
pub use uploads::*;
