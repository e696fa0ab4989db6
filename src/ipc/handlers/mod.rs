pub mod cache;
pub mod calendar;
pub mod core;
pub mod setup;
pub mod week_filter;
