use std::sync::Arc;

use tracing::info;

use crate::controller::AllocationOutcome;
use crate::guard::{self, ReleaseOutcome};
use crate::terminal::app::Services;
use crate::terminal::cli::AllocateArgs;
use crate::terminal::error::CliError;
use crate::view::{TerminalView, route_initial_screen};

pub async fn allocate(services: &Services, args: AllocateArgs) -> Result<(), CliError> {
    let view = Arc::new(TerminalView::new());
    let Some(identity) = route_initial_screen(services.gate.as_ref(), view.as_ref()).await else {
        return Err(CliError::NotSignedIn);
    };
    println!("Signed in as {}.", identity.display_name());

    let controller = services.controller(view);
    let guard = services.guard();

    // The guard listens from the start: leaving mid-allocation still releases
    // whatever handle is already on disk.
    let abandon = guard::abandonment_signal();
    tokio::pin!(abandon);

    let outcome = tokio::select! {
        outcome = controller.request_allocation(args.ram) => outcome,
        _ = &mut abandon => {
            info!(target: "cloudram::guard", "session abandoned during allocation");
            report_release(guard.on_abandon().await);
            return Err(CliError::Interrupted);
        }
    };

    match outcome {
        AllocationOutcome::Allocated(handle) => {
            if args.detach {
                println!(
                    "Keeping {} allocated. Run `cloudram release` when you are done.",
                    handle.resource_id
                );
                return Ok(());
            }
            println!("Holding the session open. Press Ctrl-C to release the machine.");
            report_release(guard.watch(abandon).await);
            Ok(())
        }
        AllocationOutcome::Failed(err) => Err(CliError::Allocation(err.to_string())),
        AllocationOutcome::Busy => Ok(()),
    }
}

pub async fn release(services: &Services) -> Result<(), CliError> {
    match services.guard().on_abandon().await {
        ReleaseOutcome::Skipped(err) => Err(CliError::Release(err.to_string())),
        outcome => {
            report_release(outcome);
            Ok(())
        }
    }
}

pub async fn status(services: &Services) -> Result<(), CliError> {
    let Some(handle) = services.handle.current()? else {
        println!("No machine is currently allocated.");
        return Ok(());
    };

    println!("Resource: {}", handle.resource_id);
    println!("Address:  {}", handle.resource_address);

    let usage = match services.gate.bearer_token().await {
        Ok(token) => services
            .api
            .ram_usage(&token, &handle.resource_address)
            .await
            .map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
    };

    match usage {
        Ok(usage) => {
            println!(
                "Memory:   {:.1} / {:.1} GB used ({:.0}%), {:.1} GB free",
                usage.used_ram, usage.total_ram, usage.percent_used, usage.available_ram
            );
        }
        Err(reason) => println!("Memory:   unavailable ({reason})"),
    }
    Ok(())
}

pub async fn sync(services: &Services) -> Result<(), CliError> {
    let Some(handle) = services.handle.current()? else {
        return Err(CliError::NoResource);
    };

    let token = services
        .gate
        .bearer_token()
        .await
        .map_err(|_| CliError::NotSignedIn)?;
    println!("🔄 Syncing Notepad++ files to {}...", handle.resource_address);
    let message = services
        .api
        .sync_notepad(&token, &handle.resource_address)
        .await?;
    println!("✅ {}", if message.is_empty() { "Sync complete." } else { message.as_str() });
    Ok(())
}

fn report_release(outcome: ReleaseOutcome) {
    match outcome {
        ReleaseOutcome::NoHandle => println!("No machine is currently allocated."),
        ReleaseOutcome::Skipped(err) => {
            eprintln!("⚠️  Machine was not released: {err}");
        }
        ReleaseOutcome::Sent {
            resource_id,
            result: Ok(status),
        } => println!("🧹 Release requested for {resource_id} ({status})."),
        ReleaseOutcome::Sent {
            resource_id,
            result: Err(err),
        } => println!("🧹 Release sent for {resource_id}; not confirmed ({err})."),
    }
}
