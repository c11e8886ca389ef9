pub mod auth;
pub mod config;
pub mod controller;
pub mod guard;
pub mod handle;
pub mod telemetry;
pub mod terminal;
pub mod view;

#[cfg(test)]
mod testing;
