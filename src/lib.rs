pub mod auth;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod rules;
pub mod sql;
pub mod tls;
pub mod wire;
