//! One route module per service surface.

pub mod auth;
pub mod delete;
pub mod insert;
pub mod read;
pub mod update;
