use txf_engine::engine::EngineConfig;

/// Formats a byte count into a human-readable string (B, KiB, MiB, GiB).
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Prints the startup banner describing what this process is about to do.
pub fn print_banner(connect: bool, transmit: bool, addr: &str, config: &EngineConfig) {
    let mode = if connect { "connect" } else { "listen" };
    let role = if transmit { "transmitter" } else { "receiver" };
    let timeout = config
        .io_timeout
        .map_or_else(|| "none".to_string(), |t| format!("{}s", t.as_secs()));

    println!();
    println!("  txf {mode} / {role}");
    println!("    Address : {addr}");
    println!("    Timeout : {timeout}");
    if !transmit {
        println!("    Save to : {}", config.receive_dir.display());
    }
    println!();
}
