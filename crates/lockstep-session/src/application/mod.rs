//! Application services over a running session.

pub mod command_handlers;
pub mod query_handlers;
