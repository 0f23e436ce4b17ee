#![warn(clippy::all)]

use chrono::Local;
use clap::{Parser, Subcommand};
use divert::error::{DivertError, Result};
use divert::network::address::Address;
use divert::network::core::{packets, Context, Handle};
use divert::network::driver::Backend;
use divert::network::filter::{validate_filter_with_docs, EndpointFilter};
use divert::network::header;
use divert::network::types::{Event, Layer, ShutdownMode, MTU_MAX};
use divert::settings::{FilterSettings, HandleSettings, Settings};
use divert::utils;
use log::{debug, error, info, warn, LevelFilter};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[cfg(windows)]
type SystemBackend = divert::network::driver::WinDivertBackend;
#[cfg(not(windows))]
type SystemBackend = divert::network::driver::MemoryBackend;

/// Events requested per receive call.
const RECV_BATCH: usize = 16;

#[derive(Parser, Debug)]
#[command(name = "divert", version, about = "Capture, inspect and reinject packets with WinDivert")]
struct Cli {
    /// Settings file to load (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the installed driver version
    Version,

    /// Print captured packets without diverting them
    Sniff {
        #[command(flatten)]
        handle: HandleSettings,

        /// Print one JSON object per packet
        #[arg(long)]
        json: bool,

        /// Stop after this many packets
        #[arg(long)]
        count: Option<usize>,
    },

    /// Divert packets and reinject them unchanged
    Passthru {
        #[command(flatten)]
        handle: HandleSettings,
    },

    /// Report flows established and deleted by selected processes
    Flowtrack {
        #[command(flatten)]
        handle: HandleSettings,

        #[command(flatten)]
        filter: FilterSettings,
    },

    /// Check a filter expression
    CheckFilter {
        /// The expression to check
        filter: String,

        #[arg(long, default_value_t = Layer::Network)]
        layer: Layer,
    },

    /// Write the effective settings to the settings file
    SaveConfig {
        #[command(flatten)]
        handle: HandleSettings,

        #[command(flatten)]
        filter: FilterSettings,
    },
}

fn init_logger(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}: {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Version => {
            let context = open_context()?;
            println!("WinDivert {}", context.version());
            Ok(())
        }
        Command::Sniff {
            handle,
            json,
            count,
        } => {
            settings.handle.merge(&handle);
            settings.handle.sniff = true;
            let context = open_context()?;
            let handle = open_handle(&context, &settings.handle)?;
            sniff(&handle, json, count)
        }
        Command::Passthru { handle } => {
            settings.handle.merge(&handle);
            settings.handle.divert_and_reinject();
            let context = open_context()?;
            let handle = open_handle(&context, &settings.handle)?;
            passthru(&handle)
        }
        Command::Flowtrack { handle, filter } => {
            settings.handle.merge(&handle);
            settings.handle.layer = Layer::Flow;
            settings.handle.sniff = true;
            settings.handle.recv_only = true;
            settings.filter.merge(&filter);

            let resolved = resolve_processes(&settings.filter.processes);
            let endpoints = settings.filter.build(resolved)?;
            let context = open_context()?;
            let handle = open_handle(&context, &settings.handle)?;
            flowtrack(&handle, &endpoints)
        }
        Command::CheckFilter { filter, layer } => check_filter(&filter, layer),
        Command::SaveConfig { handle, filter } => {
            settings.handle.merge(&handle);
            settings.filter.merge(&filter);
            let path = match cli.config {
                Some(path) => path,
                None => Settings::default_path()?,
            };
            settings.save(&path)
        }
    }
}

#[cfg(windows)]
fn open_context() -> Result<Context<SystemBackend>> {
    if !is_admin() {
        error!("Capturing packets requires administrator privileges. Please run as administrator.");
        return Err(DivertError::Driver(divert::error::codes::ERROR_ACCESS_DENIED));
    }
    Context::windivert()
}

#[cfg(not(windows))]
fn open_context() -> Result<Context<SystemBackend>> {
    Err(DivertError::Unsupported(
        "the WinDivert driver is only available on Windows",
    ))
}

/// Opens a handle and arranges for Ctrl-C to shut it down.
fn open_handle<B: Backend>(context: &Context<B>, settings: &HandleSettings) -> Result<Arc<Handle>> {
    let handle = Arc::new(context.open(settings.to_config())?);

    let interrupted = Arc::clone(&handle);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupted, shutting down");
        if let Err(e) = interrupted.shutdown(ShutdownMode::Both) {
            debug!("shutdown after interrupt failed: {}", e);
        }
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    Ok(handle)
}

/// Runs `on_batch` for every received batch until the handle is shut down.
fn receive_loop<F>(handle: &Handle, buffer_len: usize, mut on_batch: F) -> Result<()>
where
    F: FnMut(&[u8], &[Address]) -> Result<bool>,
{
    let mut buffer = vec![0u8; buffer_len];
    let mut addresses = vec![Address::new(handle.layer()); RECV_BATCH];

    loop {
        let (bytes, events) = match handle.recv_ex(&mut buffer, &mut addresses, RECV_BATCH) {
            Ok(read) => read,
            Err(e) if e.is_terminal() => break,
            Err(e) => return Err(e),
        };
        if !on_batch(&buffer[..bytes], &addresses[..events])? {
            break;
        }
    }

    handle.close()
}

fn sniff(handle: &Handle, as_json: bool, count: Option<usize>) -> Result<()> {
    let limit = count.unwrap_or(usize::MAX);
    let mut seen = 0usize;

    receive_loop(handle, MTU_MAX * RECV_BATCH, |buffer, addresses| {
        for (address, packet) in packets(buffer, addresses) {
            if as_json {
                println!("{}", packet_json(address, packet));
            } else {
                println!(
                    "{} {}",
                    utils::format_address(address),
                    utils::format_packet(packet)
                );
            }
            seen += 1;
            if seen >= limit {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

fn packet_json(address: &Address, packet: &[u8]) -> serde_json::Value {
    let mut value = json!({
        "timestamp": address.timestamp(),
        "layer": address.layer(),
        "event": address.event(),
        "outbound": address.is_outbound(),
        "loopback": address.is_loopback(),
        "length": address.length(),
    });

    if let Ok(headers) = header::decode(packet) {
        value["src"] = json!(headers.src_addr().to_string());
        value["dst"] = json!(headers.dst_addr().to_string());
        value["protocol"] = json!(headers.transport().map(|t| t.protocol()));
        value["src_port"] = json!(headers.src_port());
        value["dst_port"] = json!(headers.dst_port());
        value["payload_len"] = json!(headers.payload().len());
    }
    value
}

fn passthru(handle: &Handle) -> Result<()> {
    let mut received = 0usize;
    let mut reinjected = 0usize;

    let result = receive_loop(handle, MTU_MAX * RECV_BATCH, |buffer, addresses| {
        let batch: Vec<&[u8]> = packets(buffer, addresses).map(|(_, p)| p).collect();
        received += batch.len();
        match handle.send_ex(&batch, addresses) {
            Ok(sent) => reinjected += sent,
            Err(DivertError::HostUnreachable) => debug!("dropped undeliverable batch"),
            Err(e) if e.is_terminal() => return Ok(false),
            Err(e) => warn!("Failed to reinject batch: {}", e),
        }
        Ok(true)
    });

    utils::log_statistics(received, reinjected);
    result
}

fn flowtrack(handle: &Handle, endpoints: &EndpointFilter) -> Result<()> {
    info!(
        "Tracking flows for {} processes",
        if endpoints.pids().is_empty() {
            "all".to_string()
        } else {
            endpoints.pids().len().to_string()
        }
    );

    // Flow events carry no packet bytes.
    receive_loop(handle, 1, |_, addresses| {
        for address in addresses {
            if !endpoints.matches(address) {
                continue;
            }
            let verb = match address.event() {
                Event::FlowEstablished => "+",
                Event::FlowDeleted => "-",
                _ => "?",
            };
            println!("{} {}", verb, utils::format_address(address));
        }
        Ok(true)
    })
}

fn resolve_processes(names: &[String]) -> Vec<u32> {
    use sysinfo::{ProcessRefreshKind, RefreshKind, System};

    if names.is_empty() {
        return Vec::new();
    }

    let system = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
    );

    let wanted: Vec<String> = names
        .iter()
        .map(|n| n.to_lowercase().trim_end_matches(".exe").to_string())
        .collect();

    let pids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(_, process)| {
            let name = process.name().to_string_lossy().to_lowercase();
            wanted.iter().any(|w| name.trim_end_matches(".exe") == w)
        })
        .map(|(pid, _)| pid.as_u32())
        .collect();

    if pids.is_empty() {
        warn!("No running process matches {:?}", names);
    } else {
        info!("Resolved {:?} to PIDs {:?}", names, pids);
    }
    pids
}

fn check_filter(filter: &str, layer: Layer) -> Result<()> {
    let filter = validate_filter_with_docs(filter)?;

    #[cfg(windows)]
    {
        divert::network::driver::windivert::compile_filter(&filter, layer)?;
        let formatted = divert::network::driver::windivert::format_filter(&filter, layer)?;
        println!("{}", formatted);
    }
    #[cfg(not(windows))]
    {
        println!("{}", filter);
        debug!("Compiling for the {} layer requires the WinDivert driver", layer);
    }

    info!("Filter is valid");
    Ok(())
}

/// Check if the current process is running with administrator privileges
///
/// Uses Windows API to determine if the current process has admin rights,
/// which are required to open driver handles.
#[cfg(windows)]
fn is_admin() -> bool {
    use winapi::um::securitybaseapi::{AllocateAndInitializeSid, CheckTokenMembership, FreeSid};
    use winapi::um::winnt::{
        DOMAIN_ALIAS_RID_ADMINS, SECURITY_BUILTIN_DOMAIN_RID, SECURITY_NT_AUTHORITY,
    };

    unsafe {
        let mut sid = std::ptr::null_mut();

        if AllocateAndInitializeSid(
            &SECURITY_NT_AUTHORITY as *const _ as *mut _,
            2,
            SECURITY_BUILTIN_DOMAIN_RID,
            DOMAIN_ALIAS_RID_ADMINS,
            0,
            0,
            0,
            0,
            0,
            0,
            &mut sid,
        ) == 0
        {
            return false;
        }

        let mut is_member = 0;
        let is_admin =
            CheckTokenMembership(std::ptr::null_mut(), sid, &mut is_member) != 0 && is_member != 0;

        FreeSid(sid);
        is_admin
    }
}
