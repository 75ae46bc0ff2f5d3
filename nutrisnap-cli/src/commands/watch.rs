use clap::Args;
use nutrisnap_core::CoordinatorEvent;

use super::{entry_day, format_entry};
use crate::session::Session;

/// Follows live updates until interrupted.
#[derive(Args)]
pub struct WatchCommand {}

impl WatchCommand {
    pub async fn run(&self, session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
        if !session.coordinator.is_subscribed() {
            session.print_notices();
            return Err(
                "Live updates need a signed-in account. Run 'snap auth login <key>' first.".into(),
            );
        }

        println!("Watching for changes (Ctrl-C to stop)...");
        print_entries(session);

        loop {
            let event = tokio::select! {
                event = session.coordinator.next_event(&mut session.events) => event,
                _ = tokio::signal::ctrl_c() => break,
            };
            match event {
                Some(CoordinatorEvent::EntriesPushed(_)) => print_entries(session),
                Some(CoordinatorEvent::IdentityChanged(identity)) => {
                    println!("Identity changed: {}", identity)
                }
                Some(CoordinatorEvent::SubscriptionClosed) | None => {
                    session.print_notices();
                    break;
                }
            }
            session.print_notices();
        }
        Ok(())
    }
}

fn print_entries(session: &Session) {
    let entries = session.coordinator.entries();
    println!("\n{} entries", entries.len());
    for entry in entries {
        println!("  {}  {}", entry_day(entry), format_entry(entry));
    }
}
