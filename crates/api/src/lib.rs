//! `registra-api`: HTTP wiring for every service plus the gateway.
//!
//! One binary serves six roles (`gateway | auth | read | create | update |
//! delete`), each independently deployable; they share the router builders
//! in [`app`] and the configuration in [`config`].

pub mod app;
pub mod config;
pub mod context;
pub mod gateway;
pub mod middleware;
