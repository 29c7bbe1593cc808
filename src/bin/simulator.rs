use clap::{App, Arg};
use plsim::agent::{self, PayloadAgent};
use plsim::bus::{self, BusSender};
use plsim::config::AppConfig;
use plsim::protocol::{ProtocolHandler, ResponseStatus, StatusReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const REPORT_BROADCAST_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("plsim-simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Instrument payload simulator server")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON init file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .value_name("ADDR")
                .help("TCP listen address, overrides LISTEN_ADDR")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(listen) = matches.value_of("listen") {
        config.listen_addr = listen.to_string();
    }

    println!("🛰️  Payload Simulator");
    println!("====================");

    let mut payload_agent = PayloadAgent::new(config.clone())?;
    payload_agent.start();

    let (sender, pipe) = bus::create_pipe(&config.cmd_pipe_name, config.cmd_pipe_depth);
    let (report_tx, _) = broadcast::channel(REPORT_BROADCAST_BUFFER_SIZE);

    let tick_source = bus::spawn_tick_source(
        sender.clone(),
        config.tick_topic_id,
        Duration::from_millis(config.tick_period_ms),
    );

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("🌐 TCP server listening on {}", config.listen_addr);

    let tcp_report_tx = report_tx.clone();
    let tcp_server = tokio::spawn(async move {
        accept_clients(listener, sender, tcp_report_tx).await;
    });

    let log_report_rx = report_tx.subscribe();
    let report_logger = tokio::spawn(log_reports(log_report_rx));

    let run_loop = tokio::spawn(agent::run(payload_agent, pipe, report_tx));

    shutdown_signal().await;
    info!("🛑 Shutdown requested, closing the command pipe");

    // Dropping every publisher is what ends the run loop
    tick_source.abort();
    tcp_server.abort();

    let reason = run_loop.await?;
    info!("Run loop terminated: {}", reason);

    report_logger.abort();
    println!("Payload Simulator stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

async fn log_reports(mut reports: broadcast::Receiver<StatusReport>) {
    loop {
        match reports.recv().await {
            Ok(report) => {
                info!(
                    "📡 STATUS: seq={} power={} row={} images={} fault={}",
                    report.sequence_number,
                    report.power_state,
                    report.readout_row,
                    report.image_count,
                    report.detector_fault
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Report logger lagged, skipped {} reports", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn accept_clients(
    listener: TcpListener,
    sender: BusSender,
    report_tx: broadcast::Sender<StatusReport>,
) {
    // Client tasks hold bus senders; dropping the set aborts them all
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("🔗 New client connected: {}", addr);
                    let client_sender = sender.clone();
                    let client_report_rx = report_tx.subscribe();

                    clients.spawn(async move {
                        if let Err(e) = handle_client(stream, client_sender, client_report_rx).await {
                            warn!("Client {} error: {}", addr, e);
                        }
                        info!("🔌 Client {} disconnected", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    sender: BusSender,
    mut report_rx: broadcast::Receiver<StatusReport>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    // Wrap writer in Arc<Mutex<>> for sharing
    let writer = Arc::new(Mutex::new(writer));

    // Spawn status report streaming task
    let report_writer = Arc::clone(&writer);
    let report_task = tokio::spawn(async move {
        let mut protocol = ProtocolHandler::new();
        loop {
            let report = match report_rx.recv().await {
                Ok(report) => report,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Ok(json) = protocol.serialize_report(&report) else {
                continue;
            };

            let mut writer_guard = report_writer.lock().await;
            if let Err(e) = writer_guard.write_all(json.as_bytes()).await {
                warn!("Failed to send status report: {}", e);
                break;
            }
            if let Err(e) = writer_guard.write_all(b"\n").await {
                warn!("Failed to send status report newline: {}", e);
                break;
            }
        }
    });

    let mut protocol = ProtocolHandler::new();
    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break; // Client disconnected
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message = match protocol.parse_message(trimmed) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to parse message: {}", e);
                let error_response = protocol.create_response(0, ResponseStatus::Rejected, Some(e.to_string().as_str()));
                write_line(&writer, protocol.serialize_response(&error_response)?).await?;
                continue;
            }
        };

        // Commands wait for their response; ticks and anything else are fire and forget
        if message.command.is_some() {
            info!("📨 Received command: {:?}", message);
            match sender.request(message).await {
                Ok(response) => {
                    let json = protocol.serialize_response(&response)?;
                    write_line(&writer, json).await?;
                    info!("📤 Sent response: {}", json);
                }
                Err(e) => {
                    warn!("No response for {:?}: {}", message, e);
                }
            }
        } else {
            sender.publish(message).await?;
        }
    }

    report_task.abort();
    Ok(())
}

async fn write_line(
    writer: &Mutex<tokio::net::tcp::OwnedWriteHalf>,
    line: &str,
) -> std::io::Result<()> {
    let mut writer_guard = writer.lock().await;
    writer_guard.write_all(line.as_bytes()).await?;
    writer_guard.write_all(b"\n").await
}
