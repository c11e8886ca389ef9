pub mod allocate;
pub mod app;
pub mod auth;
pub mod cli;
pub mod error;
