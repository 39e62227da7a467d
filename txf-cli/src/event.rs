use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use txf_engine::engine::EngineEvent;

use crate::ui::format_size;

/// Spawns a task that prints engine events until the engine is dropped.
pub fn spawn_event_printer(mut events_rx: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => println!("{}", describe(&event)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("  ⚠ Missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Renders one event as a progress line.
fn describe(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Listening { addr } => format!("  ✔ Listening on {addr}"),
        EngineEvent::Connected { peer } => format!("  📡 Connected to {peer}"),
        EngineEvent::TransferComplete { file_name, size } => format!(
            "  ✅ \"{file_name}\" ({}) transferred",
            format_size(u64::from(*size))
        ),
        EngineEvent::TransferFailed { message } => format!("  ❌ Transfer failed: {message}"),
    }
}
