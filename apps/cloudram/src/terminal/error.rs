use crate::config::ConfigError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("not signed in; run `cloudram auth login` first")]
    NotSignedIn,
    #[error("no machine is currently allocated; run `cloudram allocate` first")]
    NoResource,
    #[error("allocation failed: {0}")]
    Allocation(String),
    #[error("release failed: {0}")]
    Release(String),
    #[error("provisioning service error: {0}")]
    Provision(#[from] cloudram_sdk::ProvisionError),
    #[error("local resource record error: {0}")]
    Handle(#[from] crate::handle::HandleError),
    #[error("interrupted before the allocation completed")]
    Interrupted,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
