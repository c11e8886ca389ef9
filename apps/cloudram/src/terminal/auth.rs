use crate::auth::config::AuthConfig;
use crate::auth::credentials::{AccessTokenCache, CredentialsStore, access_token_is_valid};
use crate::auth::error::AuthError;
use crate::auth::gate::TokenResponse;
use crate::auth::{self, active_profile_name};
use crate::config::ClientConfig;
use crate::terminal::cli::{AuthCommand, AuthLoginArgs, AuthLogoutArgs, AuthSwitchArgs};
use crate::terminal::error::CliError;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::time::{Instant, sleep};

const MIN_POLL_INTERVAL: u64 = 3;

pub async fn run(
    command: AuthCommand,
    config: &ClientConfig,
    profile_override: Option<String>,
) -> Result<(), CliError> {
    let path = config.credentials_path();
    match command {
        AuthCommand::Login(args) => login(&path, args, profile_override).await,
        AuthCommand::Logout(args) => logout(&path, args, profile_override),
        AuthCommand::Status => status(&path, profile_override),
        AuthCommand::SwitchProfile(args) => switch(&path, args),
    }
}

fn profile_or_default(args_profile: Option<String>, override_profile: Option<String>) -> String {
    args_profile
        .or(override_profile)
        .unwrap_or_else(|| "default".to_string())
}

async fn login(
    path: &Path,
    args: AuthLoginArgs,
    profile_override: Option<String>,
) -> Result<(), CliError> {
    let profile_name = profile_or_default(args.profile.clone(), profile_override);

    if !args.force && auth::profile_exists(path, &profile_name).map_err(auth_err)? {
        return Err(CliError::InvalidArgument(format!(
            "profile '{profile_name}' already exists; re-run with --force to replace it"
        )));
    }

    let config = AuthConfig::from_env().map_err(auth_err)?;
    let (start, client) = auth::perform_device_login(config).await.map_err(auth_err)?;

    println!("🔐 Signing in to CloudRAM as profile '{profile_name}'");
    println!("Enter the following code on the verification page:");
    println!("  Code: {}", start.user_code);
    println!(
        "  URL:  {}",
        start
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&start.verification_uri)
    );
    println!();
    println!("Waiting for approval...");

    let interval = Duration::from_secs(start.interval.max(MIN_POLL_INTERVAL));
    let deadline = Instant::now() + Duration::from_secs(start.expires_in.max(60));
    let mut last_message = Instant::now();

    loop {
        if Instant::now() >= deadline {
            return Err(CliError::Auth(
                "device code expired before the login completed".into(),
            ));
        }

        sleep(interval).await;

        match auth::complete_device_login(path, &profile_name, &client, &start.device_code).await {
            Ok(tokens) => {
                if args.set_current {
                    auth::set_current_profile(path, Some(profile_name.clone()))
                        .map_err(auth_err)?;
                }
                print_login_summary(&profile_name, &tokens);
                return Ok(());
            }
            Err(AuthError::AuthorizationPending) => {
                if last_message.elapsed() >= Duration::from_secs(10) {
                    println!("Still waiting for approval...");
                    last_message = Instant::now();
                } else {
                    print_progress_dot()?;
                }
            }
            Err(AuthError::AuthorizationDenied) => {
                return Err(CliError::Auth("authorization request was denied".into()));
            }
            Err(err) => return Err(auth_err(err)),
        }
    }
}

fn print_login_summary(profile_name: &str, tokens: &TokenResponse) {
    println!();
    println!("✅ Signed in as profile '{profile_name}'.");
    if let Some(email) = &tokens.email {
        println!("   Email: {email}");
    }
}

fn print_progress_dot() -> Result<(), CliError> {
    let mut stdout = io::stdout();
    write!(stdout, ".")?;
    stdout.flush()?;
    Ok(())
}

fn logout(
    path: &Path,
    args: AuthLogoutArgs,
    profile_override: Option<String>,
) -> Result<(), CliError> {
    if args.all && profile_override.is_some() {
        return Err(CliError::InvalidArgument(
            "--all cannot be combined with --profile".into(),
        ));
    }

    let mut store = CredentialsStore::load(path).map_err(auth_err)?;
    if args.all {
        let names = store.profile_names();
        if names.is_empty() {
            println!("No profiles to remove.");
            return Ok(());
        }

        for name in &names {
            store.remove_profile(name);
        }
        store.current_profile = None;
        store.save(path).map_err(auth_err)?;
        println!("Removed {count} profile(s).", count = names.len());
        return Ok(());
    }

    let target = profile_override
        .or_else(|| store.current_profile.clone())
        .ok_or_else(|| CliError::Auth("no profile to remove".into()))?;

    if store.remove_profile(&target).is_some() {
        store.save(path).map_err(auth_err)?;
        println!("Removed profile '{target}'.");
        Ok(())
    } else {
        Err(CliError::Auth(format!(
            "profile '{target}' not found in credential store"
        )))
    }
}

fn status(path: &Path, profile_override: Option<String>) -> Result<(), CliError> {
    let store = CredentialsStore::load(path).map_err(auth_err)?;
    if store.profiles.is_empty() {
        println!("No profiles have been configured.");
        return Ok(());
    }

    let active_name = store.current_profile.clone();
    println!("Profiles:");
    for name in store.profile_names() {
        let marker = if Some(&name) == active_name.as_ref() {
            "*"
        } else {
            " "
        };
        println!("  {marker} {name}");
    }

    let selected = match active_profile_name(&store, profile_override.as_deref()) {
        Ok(name) => name,
        Err(err) => {
            println!();
            println!("{err}");
            return Ok(());
        }
    };

    if let Some(profile) = store.profile(&selected) {
        println!();
        println!("Profile: {selected}");
        if let Some(email) = &profile.email {
            println!("  Email: {email}");
        }
        println!(
            "  Access token: {}",
            describe_access_token(profile.access_token.as_ref())
        );
    }

    Ok(())
}

// Uses the same validity rule as the session gate, so a token shown as live
// is one the next command will actually send.
fn describe_access_token(cache: Option<&AccessTokenCache>) -> String {
    match cache {
        Some(cache) if !access_token_is_valid(cache) => {
            "expired (refreshes on next use)".to_string()
        }
        Some(cache) => {
            let remaining = cache.expires_at - OffsetDateTime::now_utc();
            format!("expires {}", format_duration(remaining))
        }
        None => "none".to_string(),
    }
}

fn switch(path: &Path, args: AuthSwitchArgs) -> Result<(), CliError> {
    if args.unset && args.profile.is_some() {
        return Err(CliError::InvalidArgument(
            "cannot pass a profile name when --unset is provided".into(),
        ));
    }

    if args.unset {
        auth::set_current_profile(path, None).map_err(auth_err)?;
        println!("Cleared the active profile.");
        return Ok(());
    }

    let profile = args
        .profile
        .ok_or_else(|| CliError::InvalidArgument("provide a profile name or use --unset".into()))?;

    auth::set_current_profile(path, Some(profile.clone())).map_err(auth_err)?;
    println!("Active profile set to '{profile}'.");
    Ok(())
}

fn format_duration(duration: TimeDuration) -> String {
    if duration.is_negative() {
        return "in the past".into();
    }
    let secs = duration.whole_seconds();
    if secs < 60 {
        return format!("in {secs} seconds");
    }
    let mins = duration.whole_minutes();
    if mins < 60 {
        return format!("in {mins} minutes");
    }
    let hours = duration.whole_hours();
    if hours < 48 {
        return format!("in {hours} hours");
    }
    let days = hours / 24;
    format!("in {days} days")
}

fn auth_err(error: AuthError) -> CliError {
    CliError::Auth(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_humanized() {
        assert_eq!(format_duration(TimeDuration::seconds(-5)), "in the past");
        assert_eq!(format_duration(TimeDuration::seconds(42)), "in 42 seconds");
        assert_eq!(format_duration(TimeDuration::minutes(15)), "in 15 minutes");
        assert_eq!(format_duration(TimeDuration::hours(5)), "in 5 hours");
        assert_eq!(format_duration(TimeDuration::days(3)), "in 3 days");
    }

    #[test]
    fn token_inside_refresh_window_reads_as_expired() {
        let cache = |secs: i64| AccessTokenCache {
            token: "t".into(),
            expires_at: OffsetDateTime::now_utc() + TimeDuration::seconds(secs),
        };
        assert_eq!(
            describe_access_token(Some(&cache(20))),
            "expired (refreshes on next use)"
        );
        assert!(describe_access_token(Some(&cache(600))).starts_with("expires in"));
        assert_eq!(describe_access_token(None), "none");
    }

    #[test]
    fn profile_defaults_to_default() {
        assert_eq!(profile_or_default(None, None), "default");
        assert_eq!(profile_or_default(None, Some("work".into())), "work");
        assert_eq!(
            profile_or_default(Some("named".into()), Some("work".into())),
            "named"
        );
    }
}
