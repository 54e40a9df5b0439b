//! Terminal client for a REST chat backend.

pub mod api;
pub mod app;
pub mod config;
pub mod creator;
pub mod event;
pub mod format;
pub mod messages;
pub mod model;
pub mod rooms;
pub mod session;
pub mod timer;
pub mod ui;
