// Library exports for Socialite
// This allows integration tests and the binary to share the same modules

pub mod accounts;
pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod routes;
pub mod social;
pub mod state;
pub mod timefmt;
pub mod uploads;
