//! `mancon` – manual-control bridge shell
//!
//! This binary runs a [`ManualControlBridge`] over the simulated bus and lets
//! an operator play one or more clients by hand.  It:
//!
//! 1. Loads `~/.mancon/config.toml`, writing the defaults on first run.
//! 2. Populates the simulated bus with the configured modules.
//! 3. Prints every outbound notification as it is sent.
//! 4. Drops the user into an interactive REPL (`/help` for commands).
//! 5. Intercepts **Ctrl-C** to stop manual control, fail-safing every open
//!    module, before exiting.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

use mancon_hal::sim::SimTransport;
use mancon_runtime::{ChannelNotifier, ManualControlBridge, init_tracing};

fn main() {
    let _telemetry = init_tracing("mancon");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Simulated bus ─────────────────────────────────────────────────────
    let transport = Arc::new(SimTransport::new());
    for descriptor in &cfg.sim.modules {
        transport
            .add_module(descriptor)
            .set_latency(Duration::from_millis(cfg.sim.latency_ms));
        println!("  Module {} on the simulated bus", descriptor.to_string().bold());
    }

    // ── Bridge + notification printer ─────────────────────────────────────
    let (notifier, outbox) = ChannelNotifier::new();
    let bridge = ManualControlBridge::new(transport, cfg.bridge.clone(), Arc::new(notifier));
    let printer = thread::Builder::new().name("mancon-notify".to_string()).spawn(move || {
        for (client, message) in outbox.iter() {
            let body = serde_json::to_string(&message.notification).unwrap_or_default();
            println!("\n  {} {} {}", "→".magenta().bold(), client.to_string().bold(), body);
        }
    });
    if let Err(e) = printer {
        warn!(error = %e, "notification printer unavailable; notifications will be dropped");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrlc_bridge = bridge.clone();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping manual control …".yellow().bold());
        ctrlc_bridge.stop();
        println!("{}", "  ✓ Every open module is fail-safed.".green());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; modules are only safed on /quit");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&bridge, shutdown);
    bridge.stop();
}

fn print_banner() {
    println!();
    println!("{}", r#"  __ _  ___ ____  _______  ___ "#.bold().cyan());
    println!("{}", r#" /  ' \/ _ `/ _ \/ __/ _ \/ _ \"#.bold().cyan());
    println!("{}", r#"/_/_/_/\_,_/_//_/\__/\___/_//_/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "mancon".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Manual-control session bridge");
    println!();
}
