//! Regulatory reporting backend: users, their businesses and the monthly
//! production reports each business files.

pub mod app;
pub mod auth;
pub mod business;
pub mod config;
pub mod error;
pub mod extract;
pub mod listing;
pub mod mail;
pub mod reports;
pub mod state;
pub mod store;
