use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod echo;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an in-process echo server against a set of clients.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Layer the echo scenario runs on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EchoMode {
    /// Raw byte channels from `Broker::accept`/`connect`.
    Channel,
    /// Framed message queues from `QueueBroker::bind`/`connect`.
    Queue,
}

impl EchoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EchoMode::Channel => "channel",
            EchoMode::Queue => "queue",
        }
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Number of client brokers.
    #[arg(long, default_value_t = 3)]
    pub clients: usize,
    /// Messages each client sends and expects back.
    #[arg(long, default_value_t = 10)]
    pub messages: usize,
    /// Size of each message in bytes.
    #[arg(long, default_value_t = 64)]
    pub message_size: usize,
    /// Port the echo server listens on.
    #[arg(long, default_value_t = 1234)]
    pub port: u16,
    /// Ring-buffer capacity of every channel (one slot stays free).
    #[arg(long, default_value_t = simsock_transport::DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// Which layer to exercise.
    #[arg(long, value_enum, default_value = "queue")]
    pub mode: EchoMode,
    /// Give up after this long (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
