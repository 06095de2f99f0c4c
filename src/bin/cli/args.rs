use clap::Parser;
use logsub::Commitment;

#[derive(Parser)]
#[command(name = "logsub")]
#[command(version)]
#[command(about = "Tail program logs over a JSON-RPC logsSubscribe WebSocket")]
pub struct Cli {
    /// RPC WebSocket endpoint
    #[arg(short, long, default_value = logsub::config::DEFAULT_URL)]
    pub url: String,

    /// Account address whose transactions to follow
    #[arg(short, long, conflicts_with = "all")]
    pub mentions: Option<String>,

    /// Follow all transactions instead of one address
    #[arg(long)]
    pub all: bool,

    /// Include simple vote transactions (with --all)
    #[arg(long, requires = "all")]
    pub with_votes: bool,

    /// Commitment level (processed, confirmed, finalized)
    #[arg(short, long, default_value = "finalized")]
    pub commitment: Commitment,

    /// Initial reconnect delay in milliseconds
    #[arg(long, default_value_t = 500)]
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub reconnect_cap_ms: u64,

    /// Drop the connection after this many seconds without frames
    #[arg(long, default_value_t = 60)]
    pub idle_timeout_secs: u64,

    /// Keepalive ping interval in seconds (0 disables pings)
    #[arg(long, default_value_t = 30)]
    pub ping_secs: u64,

    /// Only print log lines containing this text
    #[arg(long)]
    pub contains: Option<String>,

    /// Suppress log lines that were already printed
    #[arg(long)]
    pub dedupe: bool,

    /// Print only lines carrying NAME=<digits>, once per distinct value
    /// (e.g. --contains PrimeFound --dedupe-key number_to_test)
    #[arg(long, value_name = "NAME")]
    pub dedupe_key: Option<String>,

    /// Print the raw notification payload instead of log lines
    #[arg(long)]
    pub raw: bool,

    /// Show session summary on exit
    #[arg(long)]
    pub summary: bool,
}
