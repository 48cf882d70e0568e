//! Library crate for blind-clock-back: tournament clocks, their progression
//! engine, persistence and the HTTP/SSE/WebSocket surfaces, exposed for
//! binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod mirror;
pub mod routes;
pub mod services;
pub mod state;
