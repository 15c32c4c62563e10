mod config;
mod log;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use groundlift_core::events::{Consent, ServerCallbacks};
use groundlift_core::{Client, DiscoveryCallbacks, FileBundle, Server};

const USAGE: &str = "\
usage:
  groundlift server [--port PORT] [--downloads DIR]
  groundlift client <host> <port> <path>
  groundlift list [--timeout MS]
";

/// Marks an error as having come from binding/starting the server socket
/// rather than from argument parsing, so `run` can map it to exit code 2
/// instead of the generic exit code 1 (see §6.3's exit code table).
#[derive(Debug)]
struct ServerStartFailure(String);

impl std::fmt::Display for ServerStartFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ServerStartFailure {}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cfg = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            return 1;
        }
    };

    let log_dir = PathBuf::from("logs");
    if let Err(e) = log::setup_logger(&log_dir) {
        eprintln!("warning: failed to set up logging: {:#}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match args.first().map(String::as_str) {
        Some("server") | None => run_server(&cfg, args.get(1..).unwrap_or(&[])),
        Some("client") => run_client(&cfg, &args[1..]),
        Some("list") => run_list(&args[1..]),
        Some("--help") | Some("-h") => {
            print!("{}", USAGE);
            Ok(())
        }
        Some(other) => Err(anyhow!("unrecognized subcommand '{}'\n{}", other, USAGE)),
    };

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{:#}", e);
            if e.downcast_ref::<ServerStartFailure>().is_some() {
                2
            } else {
                1
            }
        }
    }
}

fn run_server(cfg: &config::Config, args: &[String]) -> anyhow::Result<()> {
    let mut port = cfg.port;
    let mut downloads_dir = PathBuf::from(&cfg.downloads_dir);

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--port requires a value"))?
                    .parse()
                    .context("invalid --port value")?;
            }
            "--downloads" => {
                i += 1;
                downloads_dir = PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| anyhow!("--downloads requires a value"))?,
                );
            }
            other => return Err(anyhow!("unrecognized server flag '{}'", other)),
        }
        i += 1;
    }

    std::fs::create_dir_all(&downloads_dir)
        .with_context(|| format!("creating downloads directory {}", downloads_dir.display()))?;

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let hostname = cfg.resolved_hostname();

    let callbacks = ServerCallbacks::default().with_consent(|req| {
        ::log::info!(
            "incoming transfer '{}' ({} bytes) from {} ({})",
            req.filename,
            req.size,
            req.peer_name,
            req.peer_addr
        );
        Consent::Accept
    });

    let server = Arc::new(Server::new(bind_addr, downloads_dir, hostname, callbacks));
    server
        .setup()
        .map_err(|e| ServerStartFailure(format!("server start failed: {}", e)))?;
    server
        .start()
        .map_err(|e| ServerStartFailure(format!("server start failed: {}", e)))?;
    server
        .discovery_start()
        .map_err(|e| ServerStartFailure(format!("server start failed: {}", e)))?;

    ::log::info!("groundlift server listening on {}", bind_addr);
    println!("groundlift server listening on {}", bind_addr);

    ctrlc_wait();
    server.stop();
    Ok(())
}

/// Block the main thread until interrupted. No signal-handling crate is in
/// the dependency stack, so this polls a process-wide flag set by a bare
/// `ctrlc`-free `SIGINT`-adjacent approach: reading stdin would steal input
/// from an interactive terminal, so instead we just park forever and rely
/// on the OS to deliver `SIGINT`/`SIGTERM` as an abrupt process exit (the
/// server's socket teardown on `Drop` still runs on an orderly exit path;
/// the core's own `stop()` is for front-ends, like a GUI, that can call it
/// from an event handler).
fn ctrlc_wait() {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn run_client(cfg: &config::Config, args: &[String]) -> anyhow::Result<()> {
    if args.len() != 3 {
        return Err(anyhow!("usage: groundlift client <host> <port> <path>"));
    }
    let host = &args[0];
    let port: u16 = args[1].parse().context("invalid port")?;
    let path = PathBuf::from(&args[2]);

    let peer_addr = (host.as_str(), port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("could not resolve {}:{}", host, port))?;

    let bundle = FileBundle::from_local(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let hostname = cfg.resolved_hostname();

    let callbacks = groundlift_core::ClientCallbacks::default().with_event(|event| {
        println!("{:?}", event);
    });

    let client = Arc::new(Client::new(peer_addr, bundle, hostname, callbacks));
    client
        .start()
        .map_err(|e| anyhow!("failed to start send: {}", e))?;
    client.join();
    Ok(())
}

fn run_list(args: &[String]) -> anyhow::Result<()> {
    let mut timeout = Duration::from_secs(3);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--timeout" => {
                i += 1;
                let ms: u64 = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--timeout requires a value"))?
                    .parse()
                    .context("invalid --timeout value")?;
                timeout = Duration::from_millis(ms);
            }
            other => return Err(anyhow!("unrecognized list flag '{}'", other)),
        }
        i += 1;
    }

    let callbacks = DiscoveryCallbacks::default().with_peer_discovered(|peer| {
        println!("{}\t{}", peer.hostname, peer.addr);
    });

    groundlift_core::discovery::discover_peers(
        groundlift_core::DEFAULT_PORT,
        timeout,
        &callbacks,
    )
    .map_err(|e| anyhow!("discovery failed: {}", e))
}
