use clap::{Args, Parser, Subcommand};
use cloudram_sdk::RamSize;
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "cloudram",
    about = "Rent a temporary RAM-sized cloud machine and release it when you leave",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long = "api-url",
        global = true,
        env = "CLOUDRAM_API_URL",
        value_name = "URL",
        help = "Base URL of the CloudRAM provisioning service"
    )]
    pub api_url: Option<String>,

    #[arg(
        long = "profile",
        global = true,
        env = "CLOUDRAM_PROFILE",
        value_name = "PROFILE",
        help = "Select the stored sign-in profile to use for this command"
    )]
    pub profile: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "CLOUDRAM_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "CLOUDRAM_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Allocate a machine and hold it until this session ends
    Allocate(AllocateArgs),
    /// Release the currently held machine
    Release,
    /// Show the currently held machine and its memory usage
    Status,
    /// Sync locally open Notepad++ files onto the held machine
    Sync,
    /// Manage sign-in credentials and profiles
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Args, Debug)]
pub struct AllocateArgs {
    #[arg(
        long = "ram",
        value_name = "GB",
        help = "Amount of RAM to allocate, in whole gigabytes"
    )]
    pub ram: RamSize,

    #[arg(
        long = "detach",
        action = clap::ArgAction::SetTrue,
        help = "Exit after allocation and keep the machine until `cloudram release`"
    )]
    pub detach: bool,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Start a device login to acquire credentials
    Login(AuthLoginArgs),
    /// Remove stored credentials
    Logout(AuthLogoutArgs),
    /// Show stored credential status
    Status,
    /// Switch the active profile
    SwitchProfile(AuthSwitchArgs),
}

#[derive(Args, Debug)]
pub struct AuthLoginArgs {
    #[arg(
        long = "name",
        value_name = "PROFILE",
        help = "Profile name to create or update (defaults to 'default')"
    )]
    pub profile: Option<String>,

    #[arg(
        long = "set-current",
        action = clap::ArgAction::SetTrue,
        help = "Set this profile as the active profile after login completes"
    )]
    pub set_current: bool,

    #[arg(
        long = "force",
        action = clap::ArgAction::SetTrue,
        help = "Overwrite existing credentials for the profile if present"
    )]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct AuthLogoutArgs {
    #[arg(
        long = "all",
        action = clap::ArgAction::SetTrue,
        help = "Remove all stored credentials"
    )]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct AuthSwitchArgs {
    #[arg(value_name = "PROFILE", help = "Profile name to mark as active")]
    pub profile: Option<String>,

    #[arg(
        long = "unset",
        action = clap::ArgAction::SetTrue,
        help = "Clear the active profile"
    )]
    pub unset: bool,
}
