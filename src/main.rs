use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serial_assistant::codec;
use serial_assistant::config::{Config, ConfigLoader, PollingConfig, SerialConfig};
use serial_assistant::logging;
use serial_assistant::{
    CloseRequest, OpenRequest, ReadRequest, TeardownReport, TransportResult, TransportService,
    WriteRequest,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Serial debugging assistant: list ports, send payloads and monitor traffic.",
    long_about = "Opens serial ports with explicit line parameters and exchanges text or hex payloads with the attached device. Defaults come from serial-assistant.toml; RUST_LOG controls log verbosity."
)]
struct Cli {
    /// Use this configuration file instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial devices present on this machine.
    List {
        /// Print descriptors as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Open a port, send one payload, print the reply and close.
    Send {
        #[command(flatten)]
        line: LineArgs,
        /// Treat DATA as hex digits, e.g. "AB CD 01".
        #[arg(long)]
        hex: bool,
        /// How long to wait for a reply, in milliseconds.
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
        /// Payload to send.
        data: String,
    },
    /// Print incoming data as it arrives; lines typed on stdin are sent.
    Monitor {
        #[command(flatten)]
        line: LineArgs,
        /// Show received bytes and parse typed lines as hex.
        #[arg(long)]
        hex: bool,
    },
}

/// Port name and line parameters. Anything left out falls back to the config.
#[derive(Args, Debug)]
struct LineArgs {
    /// Port name or alias, e.g. COM3 or /dev/ttyUSB0.
    #[arg(short, long)]
    port: String,
    #[arg(short, long)]
    baud: Option<u32>,
    #[arg(long)]
    data_bits: Option<u8>,
    #[arg(long)]
    stop_bits: Option<u8>,
    /// none, odd or even
    #[arg(long)]
    parity: Option<String>,
}

impl LineArgs {
    fn to_request(&self, defaults: &SerialConfig) -> OpenRequest {
        OpenRequest {
            port_name: defaults.resolve_port(self.port.trim()),
            baud_rate: self.baud.unwrap_or(defaults.default_baud),
            data_bits: self.data_bits.unwrap_or(defaults.default_data_bits),
            stop_bits: self.stop_bits.unwrap_or(defaults.default_stop_bits),
            parity: self
                .parity
                .clone()
                .unwrap_or_else(|| defaults.default_parity.clone()),
        }
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    logging::init(&config.logging)?;

    let service = TransportService::system();

    match cli.command {
        Command::List { json } => list(&service, json),
        Command::Send {
            line,
            hex,
            wait_ms,
            data,
        } => {
            let req = line.to_request(&config.serial);
            let polling = config.polling.clone();
            tokio::task::spawn_blocking(move || send(&service, req, &data, hex, wait_ms, &polling))
                .await?
        }
        Command::Monitor { line, hex } => {
            let req = line.to_request(&config.serial);
            monitor(service, req, hex, config.polling).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, BoxError> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

fn list(service: &TransportService, json: bool) -> Result<(), BoxError> {
    let ports = service.list_ports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports detected");
        return Ok(());
    }
    for port in &ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{:<20} {}  [{:04X}:{:04X}]",
                port.port_name, port.port_type, vid, pid
            ),
            _ => println!("{:<20} {}", port.port_name, port.port_type),
        }
    }
    Ok(())
}

fn send(
    service: &TransportService,
    req: OpenRequest,
    data: &str,
    hex: bool,
    wait_ms: u64,
    polling: &PollingConfig,
) -> Result<(), BoxError> {
    let port_name = req.port_name.clone();
    service.open_port(req)?;

    let result = exchange(service, &port_name, data, hex, wait_ms, polling);
    let closed = service.close_port(CloseRequest {
        port_name: port_name.clone(),
    });

    result?;
    closed?;
    Ok(())
}

fn exchange(
    service: &TransportService,
    port_name: &str,
    data: &str,
    hex: bool,
    wait_ms: u64,
    polling: &PollingConfig,
) -> Result<(), BoxError> {
    let written = service.write_data(WriteRequest {
        port_name: port_name.to_string(),
        data: data.to_string(),
        is_hex: hex,
    })?;
    println!("{} TX {} bytes", timestamp(), written.bytes_written);

    let deadline = Instant::now() + Duration::from_millis(wait_ms);
    let mut reply = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let chunk = service.read_data(ReadRequest {
            port_name: port_name.to_string(),
            timeout_ms: remaining.min(polling.read_timeout()).as_millis() as u64,
        })?;
        reply.extend_from_slice(&chunk);
    }

    if reply.is_empty() {
        println!("{} no reply within {wait_ms} ms", timestamp());
    } else {
        println!(
            "{} RX {} bytes: {}",
            timestamp(),
            reply.len(),
            render(&reply, hex)
        );
    }
    Ok(())
}

async fn monitor(
    service: TransportService,
    req: OpenRequest,
    hex: bool,
    polling: PollingConfig,
) -> Result<(), BoxError> {
    let port_name = req.port_name.clone();
    service.open_port(req)?;
    println!(
        "Monitoring {port_name} (Ctrl+C to stop, type a line and press Enter to send)"
    );

    let (line_tx, mut lines) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(polling.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut rx_total = 0u64;
    let mut tx_total = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
            Some(line) = lines.recv() => {
                if line.is_empty() {
                    continue;
                }
                let req = WriteRequest {
                    port_name: port_name.clone(),
                    data: line,
                    is_hex: hex,
                };
                match off_worker(&service, move |svc| svc.write_data(req)).await? {
                    Ok(written) => {
                        tx_total += written.bytes_written as u64;
                        println!(
                            "{} TX {} bytes  (RX {rx_total} / TX {tx_total})",
                            timestamp(),
                            written.bytes_written
                        );
                    }
                    // A typo in a hex line should not end the session.
                    Err(e) => eprintln!("{} send failed: {e}", timestamp()),
                }
            }
            _ = ticker.tick() => {
                let req = ReadRequest {
                    port_name: port_name.clone(),
                    timeout_ms: polling.read_timeout_ms,
                };
                match off_worker(&service, move |svc| svc.read_data(req)).await? {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => {
                        rx_total += bytes.len() as u64;
                        println!(
                            "{} RX {} bytes: {}  (RX {rx_total} / TX {tx_total})",
                            timestamp(),
                            bytes.len(),
                            render(&bytes, hex)
                        );
                    }
                    Err(e) => {
                        warn!(port = %port_name, error = %e, "read failed, stopping monitor");
                        eprintln!("{} read failed: {e}", timestamp());
                        break;
                    }
                }
            }
        }
    }

    report_teardown(&service.shutdown());
    println!("Closed {port_name}: RX {rx_total} bytes, TX {tx_total} bytes");
    Ok(())
}

/// Run a blocking transport call on the blocking pool so the select loop keeps ticking.
async fn off_worker<T, F>(service: &TransportService, call: F) -> Result<TransportResult<T>, JoinError>
where
    F: FnOnce(&TransportService) -> TransportResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || call(&service)).await
}

fn report_teardown(report: &TeardownReport) {
    for failure in &report.failures {
        eprintln!("failed to close {}: {}", failure.port, failure.error);
    }
}

fn render(bytes: &[u8], hex: bool) -> String {
    if hex {
        codec::encode_hex(bytes)
    } else {
        format!("{:?}", codec::decode_text(bytes))
    }
}

fn timestamp() -> String {
    format!("[{}]", Local::now().format("%H:%M:%S%.3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from([
            "serial-assistant",
            "send",
            "--port",
            "COM3",
            "--baud",
            "115200",
            "--hex",
            "AB CD",
        ])
        .unwrap();
        match cli.command {
            Command::Send {
                line,
                hex,
                data,
                wait_ms,
            } => {
                assert_eq!(line.port, "COM3");
                assert_eq!(line.baud, Some(115200));
                assert!(hex);
                assert_eq!(data, "AB CD");
                assert_eq!(wait_ms, 500);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_line_args_fall_back_to_config() {
        let mut defaults = SerialConfig::default();
        defaults.default_baud = 57600;
        defaults
            .port_aliases
            .insert("board".to_string(), "/dev/ttyACM0".to_string());

        let line = LineArgs {
            port: "board".into(),
            baud: None,
            data_bits: Some(7),
            stop_bits: None,
            parity: Some("even".into()),
        };
        let req = line.to_request(&defaults);
        assert_eq!(req.port_name, "/dev/ttyACM0");
        assert_eq!(req.baud_rate, 57600);
        assert_eq!(req.data_bits, 7);
        assert_eq!(req.stop_bits, 1);
        assert_eq!(req.parity, "even");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_port_calls_leave_the_runtime_free() {
        use serial_assistant::port::MockBackend;
        use serial_assistant::DeviceClass;
        use std::sync::Arc;

        let backend = Arc::new(MockBackend::new());
        backend.add_port("COM1", DeviceClass::Usb);
        let service = TransportService::new(backend.clone());
        service.open_port(OpenRequest::new("COM1")).unwrap();

        let started = Instant::now();
        let write = WriteRequest {
            port_name: "COM1".into(),
            data: "AT".into(),
            is_hex: false,
        };
        let written = off_worker(&service, move |svc| svc.write_data(write))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(written.bytes_written, 2);

        // An idle read blocks for its whole timeout; a timer on the same
        // single-threaded runtime must still fire long before that.
        let read = ReadRequest {
            port_name: "COM1".into(),
            timeout_ms: 400,
        };
        let (bytes, ticked_at) = tokio::join!(
            off_worker(&service, move |svc| svc.read_data(read)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                started.elapsed()
            }
        );
        assert!(bytes.unwrap().unwrap().is_empty());
        assert!(ticked_at < Duration::from_millis(200), "timer waited {ticked_at:?}");
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&[0xAB, 0x01], true), "AB 01");
        assert_eq!(render(b"hi\n", false), "\"hi\\n\"");
    }
}
