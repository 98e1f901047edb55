//! Session domain: the driver, its roster, and the commands it accepts.

pub mod commands;
pub mod game;
pub mod roster;
