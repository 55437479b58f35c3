//! Run automatic-repeat-request protocols over a simulated unreliable link.

use clap::{builder::PossibleValue, value_parser, Arg, ArgAction, ArgMatches, Command};
use rdtsim_arq::{alternating_bit, go_back_n};
use rdtsim_simulator::{Config, Error, Participant, Report, Simulation};
use std::process::ExitCode;
use tracing::{error, info, Level};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

const MESSAGES_FLAG: &str = "messages";
const LOSS_FLAG: &str = "loss";
const CORRUPTION_FLAG: &str = "corruption";
const INTERVAL_FLAG: &str = "interval";
const TRACE_FLAG: &str = "trace";
const PROTOCOL_FLAG: &str = "protocol";
const BIDIRECTIONAL_FLAG: &str = "bidirectional";
const DEADLINE_FLAG: &str = "deadline";
const METRICS_FLAG: &str = "metrics";

const ALTERNATING_BIT: &str = "alternating-bit";
const GO_BACK_N: &str = "go-back-n";

fn command() -> Command {
    Command::new("rdtsim")
        .version(crate_version())
        .about("Run automatic-repeat-request protocols over a simulated unreliable link.")
        .arg(
            Arg::new(MESSAGES_FLAG)
                .long(MESSAGES_FLAG)
                .default_value("10")
                .help("Number of messages to simulate")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(LOSS_FLAG)
                .long(LOSS_FLAG)
                .default_value("0.0")
                .help("Packet loss probability (0.0 for no loss)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(CORRUPTION_FLAG)
                .long(CORRUPTION_FLAG)
                .default_value("0.0")
                .help("Packet corruption probability (0.0 for no corruption)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(INTERVAL_FLAG)
                .long(INTERVAL_FLAG)
                .default_value("1000.0")
                .help("Average time between messages from the sender's application layer (> 0)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(TRACE_FLAG)
                .long(TRACE_FLAG)
                .short('t')
                .default_value("0")
                .help("Trace level (0: warnings, 1: summary, 2: protocol events, 3: every event)")
                .value_parser(value_parser!(u8).range(0..=3)),
        )
        .arg(
            Arg::new(PROTOCOL_FLAG)
                .long(PROTOCOL_FLAG)
                .short('p')
                .default_value(ALTERNATING_BIT)
                .help("Protocol run by both entities")
                .value_parser([
                    PossibleValue::new(ALTERNATING_BIT),
                    PossibleValue::new(GO_BACK_N),
                ]),
        )
        .arg(
            Arg::new(BIDIRECTIONAL_FLAG)
                .long(BIDIRECTIONAL_FLAG)
                .help("Address application messages to both entities")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(DEADLINE_FLAG)
                .long(DEADLINE_FLAG)
                .help("Abort if the simulation runs past this time")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(METRICS_FLAG)
                .long(METRICS_FLAG)
                .help("Print metrics after the simulation terminates")
                .action(ArgAction::SetTrue),
        )
}

/// Map a trace level argument to the maximum level logged.
fn level(trace: u8) -> Level {
    match trace {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Build a simulation configuration from parsed arguments (defaults fill in anything missing).
fn config(matches: &ArgMatches) -> Config {
    let defaults = Config::default();
    Config {
        messages: matches
            .get_one::<u64>(MESSAGES_FLAG)
            .copied()
            .unwrap_or(defaults.messages),
        loss_probability: matches
            .get_one::<f64>(LOSS_FLAG)
            .copied()
            .unwrap_or(defaults.loss_probability),
        corruption_probability: matches
            .get_one::<f64>(CORRUPTION_FLAG)
            .copied()
            .unwrap_or(defaults.corruption_probability),
        mean_interval: matches
            .get_one::<f64>(INTERVAL_FLAG)
            .copied()
            .unwrap_or(defaults.mean_interval),
        bidirectional: matches.get_flag(BIDIRECTIONAL_FLAG),
        deadline: matches.get_one::<f64>(DEADLINE_FLAG).copied(),
        ..defaults
    }
}

fn simulate<S: Participant, R: Participant>(
    cfg: Config,
    sender: S,
    receiver: R,
    metrics: bool,
) -> Result<Report, Error> {
    let mut simulation = Simulation::new(cfg, sender, receiver)?;
    let result = simulation.run();
    if metrics {
        match simulation.encode_metrics() {
            Ok(encoded) => print!("{encoded}"),
            Err(e) => error!(error = ?e, "failed to encode metrics"),
        }
    }
    result
}

fn main() -> ExitCode {
    // Parse arguments
    let matches = command().get_matches();

    // Create logger
    let trace = matches.get_one::<u8>(TRACE_FLAG).copied().unwrap_or(0);
    tracing_subscriber::fmt().with_max_level(level(trace)).init();

    // Run simulation
    let cfg = config(&matches);
    let metrics = matches.get_flag(METRICS_FLAG);
    let protocol = matches
        .get_one::<String>(PROTOCOL_FLAG)
        .map(String::as_str)
        .unwrap_or(ALTERNATING_BIT);
    info!(protocol, ?cfg, "running simulation");
    let result = match protocol {
        GO_BACK_N => simulate(
            cfg,
            go_back_n::Sender::default(),
            go_back_n::Receiver::default(),
            metrics,
        ),
        _ => simulate(
            cfg,
            alternating_bit::Sender::default(),
            alternating_bit::Receiver::default(),
            metrics,
        ),
    };
    match result {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
