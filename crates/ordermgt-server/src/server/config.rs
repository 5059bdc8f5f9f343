use crate::server::streaming::window::BatchPolicy;
use anyhow::bail;
use clap::Parser;
use ordermgt_core::types::DEFAULT_BATCH_SIZE;

/// Runtime configuration for the `ordermgt-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults matching the stock order
/// service: first shipment flush after 3 ids, then every 4.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordermgt-server",
    version,
    about = "A gRPC service for managing orders and aggregating them into shipments"
)]
pub struct CliArgs {
    /// Number of processed order ids that triggers a shipment flush on a
    /// `ProcessOrders` stream.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Value of the batch counter when a `ProcessOrders` stream starts.
    ///
    /// The counter is compared against `BATCH_SIZE` after each order id, so
    /// starting at 1 flushes after exactly `BATCH_SIZE` ids.
    ///
    /// Environment variable: `BATCH_INITIAL_MARKER`
    #[arg(long, env = "BATCH_INITIAL_MARKER", default_value_t = 1)]
    pub batch_initial_marker: usize,

    /// Value the batch counter is reset to after every flush.
    ///
    /// The default of 0 makes every window after the first one
    /// `BATCH_SIZE + 1` ids long. Set it to 1 to flush every `BATCH_SIZE`
    /// ids.
    ///
    /// Environment variable: `BATCH_RESET_MARKER`
    #[arg(long, env = "BATCH_RESET_MARKER", default_value_t = 0)]
    pub batch_reset_marker: usize,

    /// Capacity of the response buffer between a streaming handler task and
    /// the gRPC response stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Reject `AddOrder` calls that carry no metadata with `DATA_LOSS`.
    ///
    /// Environment variable: `REQUIRE_METADATA`
    #[arg(long, env = "REQUIRE_METADATA", default_value_t = false)]
    pub require_metadata: bool,

    /// Pre-populate the order store with the sample orders 102 to 106.
    ///
    /// Environment variable: `SEED_SAMPLE_DATA`
    #[arg(
        long,
        env = "SEED_SAMPLE_DATA",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub seed_sample_data: bool,

    /// Seconds to wait for in-flight streams to finish on shutdown before
    /// they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/ordermgt.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub batch_policy: BatchPolicy,
    pub stream_buffer_size: usize,
    pub require_metadata: bool,
    pub seed_sample_data: bool,
    pub shutdown_timeout: u64,
    pub server_addr: String,
    pub uds: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            batch_policy: BatchPolicy::default(),
            stream_buffer_size: 8,
            require_metadata: false,
            seed_sample_data: true,
            shutdown_timeout: 3,
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        let batch_policy = BatchPolicy::new(
            args.batch_size,
            args.batch_initial_marker,
            args.batch_reset_marker,
        )?;

        Ok(Self {
            batch_policy,
            stream_buffer_size: args.stream_buffer_size,
            require_metadata: args.require_metadata,
            seed_sample_data: args.seed_sample_data,
            shutdown_timeout: args.shutdown_timeout,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
