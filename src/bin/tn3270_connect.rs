//! Connect to a TN3270 host and show what it sends.
//!
//! Runs the full negotiation (proxy, TLS, TELNET, TN3270E) and then prints NVT
//! text and a one-line summary of each 3270 record until the host disconnects.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use mio::{Events, Poll, Token};

use tn3270r::config::{default_config_path, SessionConfig};
use tn3270r::proxy::{HostResolver, SystemResolver};
use tn3270r::socket::MioConnector;
use tn3270r::tn3270e::BindImage;
use tn3270r::{
    Connection, ConnectionEvent, ConnectionListener, DecodeOutcome, HostDataSink, Progress,
};

const HOST: Token = Token(0);

#[derive(Debug, Default)]
struct Args {
    host: Option<String>,
    port: Option<u16>,
    proxy: Option<String>,
    tls: bool,
    lu: Option<String>,
    model: Option<i64>,
    timeout: Option<i64>,
    config: Option<PathBuf>,
}

fn usage() {
    println!("tn3270-connect - negotiate a TN3270 session and dump the data stream");
    println!();
    println!("Usage: tn3270-connect --host <host> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <host>           Host to connect to");
    println!("  --port <port>           Port (default: 23)");
    println!("  --proxy <spec>          Proxy, e.g. socks5:user:pw@gw:1080");
    println!("  --tls                   Start TLS right after connecting");
    println!("  --lu <lu[,lu...]>       LU names to request, in order");
    println!("  --model <2-5>           3278/3279 model (default: 2)");
    println!("  --timeout <seconds>     Connect timeout per address (default: 30)");
    println!("  --config <path>         Session configuration file");
    println!("  --help                  Show this help message");
    println!();
    println!("Set RUST_LOG=debug to see the TELNET negotiation, RUST_LOG=trace for hex dumps.");
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--host" | "-h" => args.host = Some(value("--host")?),
            "--port" | "-p" => {
                args.port = Some(value("--port")?.parse().context("--port must be a number")?)
            }
            "--proxy" => args.proxy = Some(value("--proxy")?),
            "--tls" => args.tls = true,
            "--lu" => args.lu = Some(value("--lu")?),
            "--model" => {
                args.model = Some(value("--model")?.parse().context("--model must be a number")?)
            }
            "--timeout" => {
                args.timeout =
                    Some(value("--timeout")?.parse().context("--timeout must be a number")?)
            }
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--help" => {
                usage();
                return Ok(None);
            }
            other => bail!("unknown option '{other}' (try --help)"),
        }
    }
    Ok(Some(args))
}

/// Prints host data instead of rendering it
struct DumpSink;

impl HostDataSink for DumpSink {
    fn process_3270(&mut self, data: &[u8]) -> DecodeOutcome {
        match data.first() {
            Some(command) => println!("[3270] {} bytes, command 0x{command:02x}", data.len()),
            None => println!("[3270] empty record"),
        }
        DecodeOutcome::OkNoOutput
    }

    fn process_nvt(&mut self, data: &[u8]) {
        let mut out = std::io::stdout();
        let _ = out.write_all(data);
        let _ = out.flush();
    }

    fn process_sscp(&mut self, data: &[u8]) -> DecodeOutcome {
        println!("[SSCP-LU] {} bytes", data.len());
        DecodeOutcome::OkNoOutput
    }

    fn bind(&mut self, image: &BindImage) {
        println!(
            "[BIND] PLU {} SLU {} default {}x{} alternate {}x{}",
            image.plu_name.as_deref().unwrap_or("?"),
            image.slu_name.as_deref().unwrap_or("?"),
            image.default_rows,
            image.default_cols,
            image.alternate_rows,
            image.alternate_cols
        );
    }

    fn unbind(&mut self) {
        println!("[UNBIND]");
    }
}

struct EventPrinter;

impl ConnectionListener for EventPrinter {
    fn on_connection_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged { from, to } => eprintln!("** {from} -> {to}"),
            other => eprintln!("** {other:?}"),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = SessionConfig::load_from_file(&config_path, "tn3270-connect".to_string())?;
    if let Some(host) = args.host {
        config.set_property("connection.host", host);
    }
    if let Some(port) = args.port {
        config.set_property("connection.port", i64::from(port));
    }
    if let Some(proxy) = args.proxy {
        config.set_property("connection.proxy", proxy);
    }
    if args.tls {
        config.set_property("connection.tls", true);
    }
    if let Some(lu) = args.lu {
        let names: Vec<String> = lu.split(',').map(|s| s.trim().to_string()).collect();
        config.set_property("connection.luNames", names);
    }
    if let Some(model) = args.model {
        config.set_property("terminal.model", model);
    }
    if let Some(timeout) = args.timeout {
        config.set_property("connection.connectTimeout", timeout);
    }

    let (host, port) = config.host_and_port()?;
    let tls = config.get_boolean_property_or("connection.tls", false);
    let settings = config.net_settings()?;

    let (dial_host, dial_port) = settings.dial_target(&host, port);
    let addresses = SystemResolver
        .resolve(&dial_host, dial_port)
        .with_context(|| format!("cannot resolve {dial_host}"))?;
    log::info!("{dial_host} resolved to {} address(es)", addresses.len());

    let mut poll = Poll::new().context("cannot create poll instance")?;
    let registry = poll.registry().try_clone()?;
    let connector = MioConnector::with_registry(registry, HOST, settings.tls.clone());
    let mut connection = Connection::new(connector, DumpSink, settings);
    connection.add_listener(Box::new(EventPrinter));

    let mut progress = connection.connect(&host, port, addresses, tls);
    let mut events = Events::with_capacity(16);
    loop {
        if let Progress::Failed(e) = &progress {
            bail!("{e}");
        }

        let timeout = connection
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match poll.poll(&mut events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("poll failed"),
        }

        if events.is_empty() {
            progress = connection.on_timeout(Instant::now());
            continue;
        }
        for event in events.iter() {
            if event.token() == HOST {
                progress = connection.advance_on_socket_event();
            }
        }
    }
}
