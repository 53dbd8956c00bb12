//! Core types for Warden.

pub mod message;
pub mod task;
pub mod usage;

pub use message::*;
pub use task::*;
pub use usage::*;
