//! `estore-server`: HTTP/WebSocket front end of the event store.

pub mod app;
pub mod config;
