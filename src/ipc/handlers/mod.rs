pub mod core;
pub mod roster;
pub mod selection;
pub mod uploads;
