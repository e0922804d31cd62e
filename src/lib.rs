pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod queue;
pub mod services;
pub mod validation;
