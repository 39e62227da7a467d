mod event;
mod ui;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use txf_engine::engine::EngineConfig;

use crate::event::spawn_event_printer;
use crate::ui::print_banner;

/// txf — send one file over a single TCP connection.
///
/// One side listens on ADDRESS:PORT, the other connects to it with
/// `--connect`. Independently of that, one side transmits a FILE and the
/// other receives it into `--receive-dir`.
#[derive(Parser, Debug)]
#[command(name = "txf", version, about)]
struct Args {
    /// Address to listen on, or to connect to with `--connect`.
    address: IpAddr,

    /// TCP port.
    port: u16,

    /// File to send. Without `--role`, giving a file selects the
    /// transmitter and omitting it selects the receiver.
    file: Option<String>,

    /// Connect to ADDRESS:PORT instead of listening on it.
    #[arg(short, long)]
    connect: bool,

    /// Which end of the transfer this process is.
    #[arg(short, long, value_enum)]
    role: Option<Role>,

    /// Deadline in seconds for each socket read, write and connect.
    /// Without it a stalled peer blocks forever.
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Directory where a received file is stored.
    #[arg(short = 'd', long, default_value = ".")]
    receive_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
    /// Read FILE and send it.
    Transmit,
    /// Store the incoming file.
    Receive,
}

/// Picks the role from the flag, falling back to whether a file was given.
fn resolve_role(role: Option<Role>, file: Option<&str>) -> anyhow::Result<Role> {
    match (role, file) {
        (Some(Role::Transmit), None) => bail!("the transmitter needs a FILE to send"),
        (Some(role), _) => Ok(role),
        (None, Some(_)) => Ok(Role::Transmit),
        (None, None) => Ok(Role::Receive),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Tracing goes to stderr so it doesn't mix with the progress lines on
    // stdout.
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("txf=info,txf_engine=info,warn")),
        )
        .init();
    debug!(?args, "Parsed arguments");

    let role = match resolve_role(args.role, args.file.as_deref()) {
        Ok(role) => role,
        Err(e) => {
            eprintln!("  ❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    if role == Role::Receive {
        if let Err(e) = std::fs::create_dir_all(&args.receive_dir) {
            eprintln!(
                "  ❌ Failed to create receive directory {}: {e}",
                args.receive_dir.display()
            );
            return ExitCode::FAILURE;
        }
    }

    let config = EngineConfig {
        io_timeout: args.timeout.map(Duration::from_secs),
        receive_dir: args.receive_dir.clone(),
        ..EngineConfig::default()
    };
    let addr = SocketAddr::new(args.address, args.port).to_string();
    let file = args.file.as_deref().unwrap_or_default();

    let engine = config.tcp_engine();
    let printer = spawn_event_printer(engine.subscribe());

    print_banner(args.connect, role == Role::Transmit, &addr, &config);

    let result = match (args.connect, role) {
        (false, Role::Transmit) => engine.listen(&addr, file, &config.transmitter()).await,
        (false, Role::Receive) => engine.listen(&addr, file, &config.receiver()).await,
        (true, Role::Transmit) => engine.connect(&addr, file, &config.transmitter()).await,
        (true, Role::Receive) => engine.connect(&addr, file, &config.receiver()).await,
    };

    // Dropping the engine closes the event channel so the printer drains
    // and exits.
    drop(engine);
    let _ = printer.await;

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
