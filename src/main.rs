use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serial_line::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serial_line::port::{
    ByteSize, FlowControl, LineSettings, LoopbackPort, ModemStatus, Parity, SerialPort,
    SerialTransport, StopBits, Timeout,
};
use serial_line::{AppError, AppResult};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-line",
    version,
    about = "Open, configure and exercise serial ports from the command line."
)]
struct Cli {
    /// Configuration file (default: SERIAL_LINE_CONFIG, ./serial-line.toml, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an in-memory loopback transport instead of a device
    #[arg(long, global = true)]
    loopback: bool,

    #[command(flatten)]
    line: LineArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the configured line settings.
#[derive(Args, Debug, Default)]
struct LineArgs {
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long, global = true)]
    byte_size: Option<u8>,

    /// none, odd, even, mark or space
    #[arg(long, global = true, value_parser = Parity::from_str)]
    parity: Option<Parity>,

    /// 1, 1.5 or 2
    #[arg(long, global = true, value_parser = StopBits::from_str)]
    stop_bits: Option<StopBits>,

    /// none, software or hardware
    #[arg(long, global = true, value_parser = FlowControl::from_str)]
    flow_control: Option<FlowControl>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial devices
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show settings, byte time and modem lines
    Info {
        port: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Write bytes
    Send {
        port: Option<String>,
        data: String,
        /// Treat DATA as hex, e.g. "de ad be ef"
        #[arg(long)]
        hex: bool,
    },
    /// Read bytes until COUNT arrive or the read timeout elapses
    Read {
        port: Option<String>,
        #[arg(long, default_value_t = 64)]
        count: usize,
        /// Override the configured read constant
        #[arg(long)]
        timeout_ms: Option<u32>,
        #[arg(long)]
        hex: bool,
    },
    /// Set and show the control lines
    Lines {
        port: Option<String>,
        #[arg(long)]
        rts: Option<Level>,
        #[arg(long)]
        dtr: Option<Level>,
    },
    /// Block until a modem input line changes
    Wait { port: Option<String> },
    /// Hold the line in break
    Break {
        port: Option<String>,
        #[arg(long, default_value_t = 250)]
        ms: u32,
    },
    /// Write a pattern and read it back (needs a loopback plug)
    EchoTest {
        port: Option<String>,
        #[arg(long, default_value_t = 32)]
        count: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    On,
    Off,
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::On
    }
}

// --- Main Application Entry Point ---
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> AppResult<()> {
    let loader = match cli.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    init_tracing(&loader.config().logging, cli.verbose);
    debug!(path = ?loader.config_path, "configuration loaded");

    let config = loader.into_config();
    let settings = line_settings(&config, &cli.line)?;
    let ctx = Context {
        config,
        settings,
        loopback: cli.loopback,
    };

    match cli.command {
        Command::List { json } => list_ports(json),
        Command::Info { port, json } => show_info(&ctx.open(port)?, json),
        Command::Send { port, data, hex } => {
            let bytes = if hex { parse_hex(&data)? } else { data.into_bytes() };
            let port = ctx.open(port)?;
            let written = port.transport().write(&bytes)?;
            port.transport().flush()?;
            println!("wrote {written} of {} bytes", bytes.len());
            Ok(())
        }
        Command::Read {
            port,
            count,
            timeout_ms,
            hex,
        } => {
            let port = ctx.open(port)?;
            if let Some(ms) = timeout_ms {
                let mut timeout = port.transport().timeout();
                timeout.read_timeout_constant = ms;
                port.transport().set_timeout(timeout);
            }
            let mut buf = vec![0u8; count];
            let n = port.transport().read(&mut buf)?;
            buf.truncate(n);
            print_received(&mut std::io::stdout().lock(), &buf, hex)?;
            info!(requested = count, received = n, "read complete");
            Ok(())
        }
        Command::Lines { port, rts, dtr } => {
            let port = ctx.open(port)?;
            let device = port.device()?;
            if let Some(level) = rts {
                device.set_rts(level.into())?;
            }
            if let Some(level) = dtr {
                device.set_dtr(level.into())?;
            }
            print_modem(&device.modem_status()?);
            Ok(())
        }
        Command::Wait { port } => {
            let port = ctx.open(port)?;
            let device = port.device()?;
            if device.wait_for_change()? {
                print_modem(&device.modem_status()?);
            } else {
                println!("port closed while waiting");
            }
            Ok(())
        }
        Command::Break { port, ms } => {
            let port = ctx.open(port)?;
            port.device()?.send_break(ms)?;
            println!("break held for {ms} ms");
            Ok(())
        }
        Command::EchoTest { port, count } => echo_test(&ctx.open(port)?, count),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

fn line_settings(config: &Config, args: &LineArgs) -> AppResult<LineSettings> {
    let mut settings = config.serial.line_settings()?;
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if let Some(bits) = args.byte_size {
        settings.byte_size = ByteSize::try_from(bits)?;
    }
    if let Some(parity) = args.parity {
        settings.parity = parity;
    }
    if let Some(stop_bits) = args.stop_bits {
        settings.stop_bits = stop_bits;
    }
    if let Some(flow_control) = args.flow_control {
        settings.flow_control = flow_control;
    }
    Ok(settings)
}

// --- Transport selection ---

struct Context {
    config: Config,
    settings: LineSettings,
    loopback: bool,
}

enum OpenPort {
    Device(SerialPort),
    Loopback(LoopbackPort),
}

impl Context {
    fn timeout(&self) -> Timeout {
        self.config.timeouts.to_timeout()
    }

    /// Open `name` (through aliases) or the configured default port.
    fn open(&self, name: Option<String>) -> AppResult<OpenPort> {
        let name = name
            .or_else(|| self.config.serial.port.clone())
            .map(|n| self.config.serial.resolve_port(&n));

        if self.loopback {
            let port = LoopbackPort::new(name.unwrap_or_else(|| "loopback".to_string()));
            port.set_timeout(self.timeout());
            return Ok(OpenPort::Loopback(port));
        }

        let path = name.ok_or_else(|| {
            AppError::InvalidInput("no port given and serial.port is not configured".to_string())
        })?;
        let port = SerialPort::new(path, self.settings, self.timeout())?;
        port.set_modem_poll_interval(self.config.serial.modem_poll_interval());
        Ok(OpenPort::Device(port))
    }
}

impl OpenPort {
    fn transport(&self) -> &dyn SerialTransport {
        match self {
            Self::Device(port) => port as &dyn SerialTransport,
            Self::Loopback(port) => port as &dyn SerialTransport,
        }
    }

    fn device(&self) -> AppResult<&SerialPort> {
        match self {
            Self::Device(port) => Ok(port),
            Self::Loopback(_) => Err(AppError::InvalidInput(
                "control lines need a real device, not --loopback".to_string(),
            )),
        }
    }
}

// --- Commands ---

#[derive(Serialize)]
struct PortEntry {
    name: String,
    kind: String,
}

fn list_ports(json: bool) -> AppResult<()> {
    let ports = serialport::available_ports()?;
    let entries: Vec<PortEntry> = ports
        .into_iter()
        .map(|p| PortEntry {
            name: p.port_name,
            kind: match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => format!(
                    "usb {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                serialport::SerialPortType::PciPort => "pci".to_string(),
                serialport::SerialPortType::BluetoothPort => "bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "unknown".to_string(),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("no serial ports found");
    } else {
        for entry in entries {
            println!("{:<24} {}", entry.name, entry.kind);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InfoReport {
    port: String,
    settings: LineSettings,
    byte_time_ns: u128,
    timeout: Timeout,
    #[serde(skip_serializing_if = "Option::is_none")]
    modem: Option<ModemStatus>,
}

fn show_info(port: &OpenPort, json: bool) -> AppResult<()> {
    let report = match port {
        OpenPort::Device(device) => InfoReport {
            port: device.path(),
            settings: device.settings(),
            byte_time_ns: device.byte_time().as_nanos(),
            timeout: SerialTransport::timeout(device),
            modem: Some(device.modem_status()?),
        },
        OpenPort::Loopback(loopback) => InfoReport {
            port: loopback.name(),
            settings: LineSettings::default(),
            byte_time_ns: 0,
            timeout: loopback.timeout(),
            modem: None,
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("port:      {}", report.port);
    println!("settings:  {}", report.settings);
    println!("byte time: {} ns", report.byte_time_ns);
    println!(
        "timeouts:  read {}+{}/byte, write {}+{}/byte, inter-byte {}",
        report.timeout.read_timeout_constant,
        report.timeout.read_timeout_multiplier,
        report.timeout.write_timeout_constant,
        report.timeout.write_timeout_multiplier,
        if report.timeout.inter_byte_unbounded() {
            "unbounded".to_string()
        } else {
            format!("{} ms", report.timeout.inter_byte_timeout)
        }
    );
    if let Some(ref modem) = report.modem {
        print_modem(modem);
    }
    Ok(())
}

fn print_modem(status: &ModemStatus) {
    let flag = |on: bool| if on { "on" } else { "off" };
    println!(
        "RTS={} DTR={} CTS={} DSR={} RI={} CD={}",
        flag(status.rts),
        flag(status.dtr),
        flag(status.cts),
        flag(status.dsr),
        flag(status.ri),
        flag(status.cd)
    );
}

fn echo_test(port: &OpenPort, count: usize) -> AppResult<()> {
    let transport = port.transport();
    let pattern: Vec<u8> = (0..count).map(|i| (i % 256) as u8).collect();

    let written = transport.write(&pattern)?;
    transport.flush()?;
    let mut echoed = vec![0u8; written];
    let received = transport.read(&mut echoed)?;

    let matched = pattern
        .iter()
        .zip(&echoed[..received])
        .take_while(|(sent, got)| sent == got)
        .count();
    info!(sent = count, written, received, matched, "echo test finished");

    if matched != count {
        return Err(AppError::EchoMismatch {
            sent: count,
            matched,
        });
    }
    println!("echo ok: {count} bytes");
    Ok(())
}

// --- Hex helpers ---

fn parse_hex(text: &str) -> AppResult<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if !digits.is_ascii() {
        return Err(AppError::InvalidInput(format!("hex data contains non-ASCII characters: '{text}'")));
    }
    if digits.len() % 2 != 0 {
        return Err(AppError::InvalidInput(format!(
            "hex data has an odd number of digits: '{text}'"
        )));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| AppError::InvalidInput(format!("invalid hex byte '{}'", &digits[i..i + 2])))
        })
        .collect()
}

/// Write received bytes as-is, or as hex, followed by a newline.
fn print_received(out: &mut impl Write, bytes: &[u8], hex: bool) -> AppResult<()> {
    if hex {
        writeln!(out, "{}", format_hex(bytes))?;
    } else {
        out.write_all(bytes)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
