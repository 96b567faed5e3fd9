//! REPL – drive a bridge by hand.
//!
//! Every non-slash line is a request from a client:
//!
//! ```text
//! <client> <command> [json-payload]
//! ```
//!
//! A `remote:` prefix on the client name marks a connection from another
//! machine.  Supported slash-commands:
//!   /help                 – show this list
//!   /status               – lifecycle state, allowed client, open handles
//!   /disconnect <client>  – simulate a client dropping its connection
//!   /foreign <name>       – start a foreign program, preempting manual control
//!   /foreign-stop         – stop the foreign program
//!   /quit | /exit         – stop manual control and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mancon_runtime::{ManualControlBridge, Response};
use mancon_types::{ClientConnection, ClientId};
use serde_json::Value;

const REMOTE_PREFIX: &str = "remote:";

/// One parsed request line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub client: ClientConnection,
    pub command: String,
    pub payload: Value,
}

/// Parse `<client> <command> [json-payload]`.
pub fn parse_request(line: &str) -> Result<Request, String> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let client = parts.next().filter(|c| !c.is_empty()).ok_or("missing client name")?;
    let command = parts.next().filter(|c| !c.is_empty()).ok_or("missing command name")?;
    let payload = match parts.next().map(str::trim) {
        None | Some("") => Value::Null,
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| format!("payload is not valid JSON: {e}"))?
        }
    };

    let client = match client.strip_prefix(REMOTE_PREFIX) {
        Some("") => return Err("missing client name after 'remote:'".to_string()),
        Some(name) => ClientConnection::remote(name),
        None => ClientConnection::local(client),
    };
    Ok(Request {
        client,
        command: command.to_string(),
        payload,
    })
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(bridge: &ManualControlBridge, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "mancon>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };
        match cmd {
            "/help" => cmd_help(),
            "/status" => cmd_status(bridge),
            "/disconnect" if !arg.is_empty() => {
                bridge.on_client_disconnected(&ClientId::new(arg));
                println!("  {} {} disconnected", "✓".green(), arg.bold());
            }
            "/foreign" if !arg.is_empty() => {
                bridge.preempt(arg);
                println!("  {} program {} is running", "✓".green(), arg.bold());
            }
            "/foreign-stop" => {
                bridge.release_preemption();
                println!("  {} default program restored", "✓".green());
            }
            "/quit" | "/exit" => {
                bridge.stop();
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown or incomplete command:".red(),
                    line.yellow(),
                    "/help".bold()
                );
            }
            _ => match parse_request(line) {
                Ok(req) => {
                    let resp = bridge.handle_request(&req.client, &req.command, req.payload);
                    print_response(&resp);
                }
                Err(e) => println!("{}: {}", "Bad request".red(), e),
            },
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Requests".bold().underline());
    println!(
        "  {} – e.g. {}",
        "<client> <command> [json]".bold().cyan(),
        r#"ds openHub {"serial":"DQ1","moduleAddress":2}"#.dimmed()
    );
    println!("  prefix the client with {} for a non-local connection", REMOTE_PREFIX.bold());
    println!();
    println!("{}", "Shell commands".bold().underline());
    println!("  {}               – bridge status", "/status".bold().cyan());
    println!("  {}  – simulate a client disconnect", "/disconnect <client>".bold().cyan());
    println!("  {}       – run a foreign program", "/foreign <name>".bold().cyan());
    println!("  {}         – stop the foreign program", "/foreign-stop".bold().cyan());
    println!("  {}         – stop manual control and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(bridge: &ManualControlBridge) {
    let status = bridge.status();
    println!();
    println!("{}", "Bridge Status".bold().underline());
    println!("  Lifecycle      : {}", format!("{:?}", status.state).yellow());
    println!("  Program        : {}", status.active_program.yellow());
    println!(
        "  Allowed client : {}",
        status
            .allowed_client
            .map(|c| c.to_string().green())
            .unwrap_or_else(|| "none".dimmed())
    );
    let open_handles = match status.open_handles {
        Some(count) => count.to_string().yellow(),
        None => "unknown (hardware busy)".dimmed(),
    };
    println!("  Open handles   : {}", open_handles);
    println!();
}

fn print_response(resp: &Response) {
    let body =
        serde_json::to_string(resp).unwrap_or_else(|e| format!("<unencodable response: {e}>"));
    if resp.ok {
        println!("  {} {}", "ok".green().bold(), body);
    } else {
        println!("  {} {}", "error".red().bold(), body);
    }
}
