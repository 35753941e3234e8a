//! CLI entry point for the SIRI VM shovel.
//!
//! `poll` fetches the feed on a fixed delay and forwards every response to a
//! directory or a RabbitMQ exchange. `import` reads those payloads back from
//! the directory or a RabbitMQ queue and projects vehicle positions into
//! Tile38. The two roles run as separate processes.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use siri_vm_shovel::broker::amqp::{AmqpPublisher, AmqpSubscriber};
use siri_vm_shovel::broker::{BrokerConfig, Resubscribing};
use siri_vm_shovel::fetch::{BasicClient, DEFAULT_DATASET_ID, DEFAULT_ENDPOINT, FeedRequest};
use siri_vm_shovel::geo::tile38::{Tile38Client, Tile38Config};
use siri_vm_shovel::pipeline::Pipeline;
use siri_vm_shovel::poller::{Poller, generate_requestor_id};
use siri_vm_shovel::projector::{DEFAULT_TRACK_KEY, ProjectOptions, Projector};
use siri_vm_shovel::sink::{FileSink, QueueSink, Sink};
use siri_vm_shovel::source::{DirectorySource, QueueSource, Source};
use siri_vm_shovel::telemetry;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "siri_vm_shovel", version)]
#[command(about = "Moves SIRI VM vehicle positions into Tile38", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the SIRI VM feed and forward each response
    Poll {
        /// Seconds to wait after each poll
        #[arg(short, long, default_value_t = 15)]
        interval: u64,

        /// requestorId to use; one is generated if not supplied
        #[arg(short = 'r', long = "requestor-id", alias = "requestorId")]
        requestor_id: Option<String>,

        /// Dataset to request
        #[arg(short, long, default_value = DEFAULT_DATASET_ID)]
        dataset_id: String,

        /// User-Agent header value
        #[arg(short, long)]
        user_agent: Option<String>,

        /// SIRI VM endpoint
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        #[command(subcommand)]
        target: Target,
    },
    /// Import vehicle positions into Tile38
    Import {
        /// Milliseconds to wait after each payload
        #[arg(short, long, default_value_t = 5000)]
        interval: u64,

        /// Tile38 host
        #[arg(short = 'H', long, default_value = "localhost")]
        host: String,

        /// Tile38 port
        #[arg(short, long, default_value_t = 9851)]
        port: u16,

        /// Tile38 collection to write positions under
        #[arg(short, long, default_value = DEFAULT_TRACK_KEY)]
        key: String,

        /// Include the full MonitoredVehicleJourney in each stored object
        #[arg(short, long)]
        verbose: bool,

        /// Let Tile38 expire positions that stop being updated
        #[arg(short, long)]
        expire: bool,

        /// TTL used with --expire
        #[arg(long, default_value_t = 300)]
        expire_seconds: u64,

        /// Log every Tile38 command
        #[arg(short = 'D', long)]
        debug: bool,

        /// Seconds to wait before resubscribing after a broker disconnect
        #[arg(long, default_value_t = 5)]
        resubscribe_delay: u64,

        #[command(subcommand)]
        source: Target,
    },
}

#[derive(Subcommand)]
enum Target {
    /// A directory of `{unix_seconds}.json` files
    File { directory: PathBuf },
    /// A RabbitMQ exchange (poll) or queue (import)
    Rabbitmq {
        name: String,

        #[command(flatten)]
        broker: BrokerArgs,
    },
}

#[derive(Args)]
struct BrokerArgs {
    /// RabbitMQ address (URI style)
    #[arg(short, long, default_value = "amqp://localhost:5672/")]
    address: String,

    /// RabbitMQ user
    #[arg(short, long, default_value = "guest")]
    user: String,

    /// RabbitMQ password
    #[arg(short, long, default_value = "guest")]
    password: String,
}

impl From<BrokerArgs> for BrokerConfig {
    fn from(args: BrokerArgs) -> Self {
        Self {
            address: args.address,
            username: args.user,
            password: args.password,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = telemetry::init()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Poll {
            interval,
            requestor_id,
            dataset_id,
            user_agent,
            endpoint,
            timeout,
            target,
        } => {
            let requestor_id = requestor_id.unwrap_or_else(generate_requestor_id);
            let user_agent = user_agent
                .unwrap_or_else(|| format!("siri_vm_shovel/{}", env!("CARGO_PKG_VERSION")));
            let request =
                FeedRequest::new(&endpoint, dataset_id, requestor_id)?.with_user_agent(&user_agent)?;

            let sink = match target {
                Target::File { directory } => Sink::File(FileSink::new(directory)),
                Target::Rabbitmq { name, broker } => {
                    let publisher = AmqpPublisher::connect(&broker.into(), &name)
                        .await
                        .context("Failed to connect to RabbitMQ")?;
                    Sink::Queue(QueueSink::new(publisher))
                }
            };

            let client = BasicClient::with_timeout(Duration::from_secs(timeout))?;
            info!(requestor_id = %request.requestor_id(), "Poller ready");
            Poller::new(client, request, sink, Duration::from_secs(interval))
                .run()
                .await;
        }
        Commands::Import {
            interval,
            host,
            port,
            key,
            verbose,
            expire,
            expire_seconds,
            debug,
            resubscribe_delay,
            source,
        } => {
            let index = Tile38Client::connect(Tile38Config {
                host,
                port,
                debug,
                expire_seconds,
            })
            .await
            .context("Failed to connect to Tile38")?;

            let source = match source {
                Target::File { directory } => {
                    let source = DirectorySource::open(&directory)
                        .await
                        .context("Failed to list import directory")?;
                    Source::Directory(source)
                }
                Target::Rabbitmq { name, broker } => {
                    let subscriber = AmqpSubscriber::new(broker.into(), name);
                    let retry_delay = Duration::from_secs(resubscribe_delay);
                    let subscription = Resubscribing::start(subscriber, retry_delay)
                        .await
                        .context("Failed to connect to RabbitMQ")?;
                    Source::Queue(QueueSource::new(subscription))
                }
            };

            let projector = Projector::new(index, key, ProjectOptions { verbose, expire });
            let stats = Pipeline::new(source, projector, Duration::from_millis(interval))
                .run()
                .await;
            info!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
