use std::io::{self, Write};

use crate::auth::{Identity, SessionGate};
use crate::handle::ResourceHandle;

/// Progress surface for the allocation control.
pub trait AllocationView: Send + Sync {
    fn set_control_enabled(&self, enabled: bool);
    fn show_progress(&self, message: &str);
    fn show_error(&self, message: &str);
    fn hide_progress(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Login,
    Home,
    ActiveResource(ResourceHandle),
}

pub trait ViewRouter: Send + Sync {
    fn show(&self, screen: Screen);
}

/// Route to `Home` when a session exists, otherwise to `Login`.
pub async fn route_initial_screen(
    gate: &dyn SessionGate,
    router: &dyn ViewRouter,
) -> Option<Identity> {
    match gate.current_identity().await {
        Ok(identity) => {
            router.show(Screen::Home);
            Some(identity)
        }
        Err(err) => {
            tracing::debug!(target: "cloudram::view", error = %err, "no session; routing to login");
            router.show(Screen::Login);
            None
        }
    }
}

/// Line-oriented terminal rendering used by the CLI.
#[derive(Debug, Default)]
pub struct TerminalView;

impl TerminalView {
    pub fn new() -> Self {
        Self
    }
}

impl AllocationView for TerminalView {
    fn set_control_enabled(&self, enabled: bool) {
        tracing::trace!(target: "cloudram::view", enabled, "allocate control");
    }

    fn show_progress(&self, message: &str) {
        println!("⏳ {message}");
    }

    fn show_error(&self, message: &str) {
        eprintln!("❌ Error: {message}");
    }

    fn hide_progress(&self) {
        let _ = io::stdout().flush();
    }
}

impl ViewRouter for TerminalView {
    fn show(&self, screen: Screen) {
        match screen {
            Screen::Login => {
                eprintln!("🔐 Not signed in. Run `cloudram auth login` first.");
            }
            Screen::Home => {
                tracing::debug!(target: "cloudram::view", "session present");
            }
            Screen::ActiveResource(handle) => {
                println!("✅ RAM allocated successfully!");
                println!("   Resource: {}", handle.resource_id);
                println!("   Address:  {}", handle.resource_address);
            }
        }
    }
}
