//! Command Tent - server-authoritative tactical skirmish engine

pub mod core;
pub mod tactical;
