use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use plsim::config::{DEFAULT_CMD_TOPIC_ID, DEFAULT_TICK_TOPIC_ID};
use plsim::protocol::{BusMessage, Command, CommandResponse, CommandType, ResponseStatus, StatusReport};
use plsim::PowerState;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const RESPONSE_TIMEOUT_S: u64 = 5;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

struct Target<'a> {
    host: &'a str,
    port: u16,
    cmd_topic: u32,
    tick_topic: u32,
    format: &'a str,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("plsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🛰️  Payload Simulator ground tool")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("cmd-topic")
                .long("cmd-topic")
                .value_name("ID")
                .help("Command topic id (hex with 0x prefix or decimal)")
                .takes_value(true)
                .global(true)
                .validator(|v| parse_topic(&v).map(|_| ())),
        )
        .arg(
            Arg::with_name("tick-topic")
                .long("tick-topic")
                .value_name("ID")
                .help("Tick topic id (hex with 0x prefix or decimal)")
                .takes_value(true)
                .global(true)
                .validator(|v| parse_topic(&v).map(|_| ())),
        )
        .subcommand(SubCommand::with_name("noop").about("🏓 Send a no-operation command"))
        .subcommand(SubCommand::with_name("reset-counters").about("Reset the valid/invalid command counters"))
        .subcommand(
            SubCommand::with_name("power")
                .about("🔋 Payload power control")
                .arg(
                    Arg::with_name("action")
                        .help("Power action")
                        .required(true)
                        .possible_values(&["on", "off", "reset"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("fault")
                .about("🛠️  Detector fault injection")
                .arg(
                    Arg::with_name("action")
                        .help("Fault action")
                        .required(true)
                        .possible_values(&["set", "clear"]),
                ),
        )
        .subcommand(SubCommand::with_name("tick").about("Publish one manual tick"))
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor the status report stream")
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("N")
                        .help("Stop after N reports (default: infinite)")
                        .takes_value(true)
                        .validator(|v| v.parse::<u32>().map(|_| ()).map_err(|e| e.to_string())),
                ),
        )
        .get_matches();

    let target = Target {
        host: matches.value_of("host").unwrap_or(DEFAULT_HOST),
        port: matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?,
        cmd_topic: matches
            .value_of("cmd-topic")
            .map(parse_topic)
            .transpose()?
            .unwrap_or(DEFAULT_CMD_TOPIC_ID),
        tick_topic: matches
            .value_of("tick-topic")
            .map(parse_topic)
            .transpose()?
            .unwrap_or(DEFAULT_TICK_TOPIC_ID),
        format: matches.value_of("format").unwrap_or("table"),
    };

    match matches.subcommand() {
        ("noop", _) => handle_command(&target, CommandType::NoOp, "No-op").await?,
        ("reset-counters", _) => handle_command(&target, CommandType::ResetCounters, "Reset counters").await?,
        ("power", Some(sub_matches)) => handle_power(sub_matches, &target).await?,
        ("fault", Some(sub_matches)) => handle_fault(sub_matches, &target).await?,
        ("tick", _) => handle_tick(&target).await?,
        ("monitor", Some(sub_matches)) => handle_monitor(sub_matches, &target).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

async fn handle_power(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult<()> {
    match matches.value_of("action") {
        Some("on") => handle_command(target, CommandType::PowerOn, "Power on").await,
        Some("off") => handle_command(target, CommandType::PowerOff, "Power off").await,
        Some("reset") => handle_command(target, CommandType::PowerReset, "Power reset").await,
        _ => {
            println!("{}", "Power action required. Use 'plsim power --help' for options.".yellow());
            Ok(())
        }
    }
}

async fn handle_fault(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult<()> {
    match matches.value_of("action") {
        Some("set") => handle_command(target, CommandType::SetFault, "Set fault").await,
        Some("clear") => handle_command(target, CommandType::ClearFault, "Clear fault").await,
        _ => {
            println!("{}", "Fault action required. Use 'plsim fault --help' for options.".yellow());
            Ok(())
        }
    }
}

async fn handle_command(target: &Target<'_>, command_type: CommandType, action: &str) -> CliResult<()> {
    let command = Command::new(current_timestamp() as u32, command_type);
    let response = send_command(target, command).await?;
    print_command_result(action, &response, target.format)
}

async fn handle_tick(target: &Target<'_>) -> CliResult<()> {
    let mut stream = connect(target).await?;
    let line = serde_json::to_string(&BusMessage::tick(target.tick_topic))?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    if target.format != "json" {
        println!("{} {}", "⏱️".bright_blue(), "Tick published".bright_white());
    }
    Ok(())
}

async fn handle_monitor(matches: &ArgMatches<'_>, target: &Target<'_>) -> CliResult<()> {
    let limit = matches.value_of("count").map(str::parse::<u32>).transpose()?;
    let stream = connect(target).await?;
    let mut lines = BufReader::new(stream).lines();

    if target.format == "table" {
        println!("{}", "📡 Monitoring payload status reports (Press Ctrl+C to stop)...".bright_blue().bold());
        println!("{}", "│      Seq │  Power │  Row │   Images │ Init │ Reset │ Fault │ Cmds ok/err │".bright_white());
    }

    let mut received = 0;
    while let Some(line) = lines.next_line().await? {
        let Ok(report) = serde_json::from_str::<StatusReport>(&line) else {
            continue;
        };
        print_report(&report, &line, target.format);

        received += 1;
        if limit.map_or(false, |limit| received >= limit) {
            break;
        }
    }

    Ok(())
}

async fn connect(target: &Target<'_>) -> CliResult<TcpStream> {
    let addr = format!("{}:{}", target.host, target.port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to payload simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin plsim-simulator".bright_cyan());
            }
            Err(e.into())
        }
    }
}

/// Send one command and wait for its response, skipping status reports
/// streamed on the same connection.
async fn send_command(target: &Target<'_>, command: Command) -> CliResult<CommandResponse> {
    let stream = connect(target).await?;
    let (reader, mut writer) = stream.into_split();
    let line = serde_json::to_string(&BusMessage::command(target.cmd_topic, command))?;

    let exchange = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if let Ok(response) = serde_json::from_str::<CommandResponse>(&line) {
                if response.id == command.id || response.id == 0 {
                    return Ok(response);
                }
            }
        }

        Err::<CommandResponse, std::io::Error>(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Server closed connection",
        ))
    };

    match tokio::time::timeout(Duration::from_secs(RESPONSE_TIMEOUT_S), exchange).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} Command timed out after {} seconds", "⏰".yellow(), RESPONSE_TIMEOUT_S);
            Err("Command timeout".into())
        }
    }
}

fn print_command_result(action: &str, response: &CommandResponse, format: &str) -> CliResult<()> {
    match format {
        "json" => println!("{}", serde_json::to_string(response)?),
        "compact" => match response.status {
            ResponseStatus::Success => println!("{}", "OK".bright_green()),
            ResponseStatus::Rejected => println!("{}", "REJECTED".bright_red()),
        },
        _ => match response.status {
            ResponseStatus::Success => {
                println!("{} {} accepted", "✅".green(), action.bright_white());
            }
            ResponseStatus::Rejected => {
                let message = response.message.as_deref().unwrap_or("Command rejected");
                println!("{} {} rejected: {}", "❌".red(), action.bright_white(), message.bright_red());

                if let Some(hint) = rejection_hint(message) {
                    println!("{} Try: {}", "💡".yellow(), hint.bright_cyan());
                }
            }
        },
    }
    Ok(())
}

fn print_report(report: &StatusReport, raw: &str, format: &str) {
    match format {
        "json" => println!("{}", raw),
        "compact" => {
            println!(
                "[{}] {} | row {} | images {} | {}",
                report.sequence_number,
                report.power_state,
                report.readout_row,
                report.image_count,
                if report.detector_fault { "FAULT" } else { "NOMINAL" }
            );
        }
        _ => {
            let power_str = match report.power_state {
                PowerState::Ready => format!("{:>6}", report.power_state).bright_green(),
                PowerState::Off => format!("{:>6}", report.power_state).dimmed(),
            };
            let fault_str = if report.detector_fault { "  YES".bright_red() } else { "   NO".green() };

            println!(
                "│ {:>8} │ {} │ {:>4} │ {:>8} │ {:>4} │ {:>5} │ {} │ {:>5}/{:<5} │",
                report.sequence_number,
                power_str,
                report.readout_row,
                report.image_count,
                report.init_cycle_count,
                report.reset_cycle_count,
                fault_str,
                report.valid_command_count,
                report.invalid_command_count
            );
        }
    }
}

/// Suggest the command that puts the payload in the state a rejected
/// command required.
fn rejection_hint(message: &str) -> Option<&'static str> {
    if message.contains("must be in OFF state") {
        Some("plsim power off")
    } else if message.contains("must be in READY state") {
        Some("plsim power on")
    } else {
        None
    }
}

fn parse_topic(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|e| format!("Invalid topic id '{}': {}", value, e))
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_follows_required_state() {
        let reset_rejected = "power reset rejected: payload must be in READY state and it's in the OFF state";
        assert_eq!(rejection_hint(reset_rejected), Some("plsim power on"));

        let on_rejected = "power on rejected: payload must be in OFF state and it's in the READY state";
        assert_eq!(rejection_hint(on_rejected), Some("plsim power off"));

        assert_eq!(rejection_hint("no handler registered for function code 9"), None);
    }

    #[test]
    fn topic_ids_parse_as_hex_or_decimal() {
        assert_eq!(parse_topic("0x1FD0"), Ok(0x1FD0));
        assert_eq!(parse_topic("8144"), Ok(8144));
        assert!(parse_topic("0xZZ").is_err());
    }
}
