use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use paybridge::config::{BridgeConfig, CredentialEndpoint, CredentialSource, HttpMethod};
use paybridge::domain::credential::EphemeralCredentialResult;
use paybridge::domain::ports::EphemeralKeyProvider;
use paybridge::infrastructure::simulated::SimulatedPaymentSdk;
use paybridge::interfaces::csv::notification_reader::NotificationReader;
use paybridge::interfaces::json::event_writer::JsonLinesEventSink;
use paybridge::PaymentBridge;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. `info`, `paybridge=debug`)
    #[arg(long, global = true, env = "PAYBRIDGE_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay SDK notifications from a CSV file and print the emitted events as JSON lines
    Replay {
        /// CSV file with a `notification,payload` header
        input: PathBuf,
    },
    /// Request one ephemeral key from the credential endpoint and print it
    FetchKey {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Credential endpoint URL, overrides the configuration file
        #[arg(long, env = "PAYBRIDGE_CREDENTIAL_URL")]
        url: Option<String>,

        /// HTTP method used for the credential endpoint (GET or POST)
        #[arg(long)]
        method: Option<HttpMethod>,

        #[arg(long, default_value = "2020-08-27")]
        api_version: String,

        /// Give up on the endpoint after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Replay { input } => replay(input).await,
        Command::FetchKey {
            config,
            url,
            method,
            api_version,
            timeout_ms,
        } => {
            let mut config = match config {
                Some(path) => BridgeConfig::from_json_file(path).into_diagnostic()?,
                None => BridgeConfig::default(),
            };
            if let Some(url) = url {
                let mut endpoint = match config.credential_source {
                    CredentialSource::Http(endpoint) => endpoint,
                    CredentialSource::Runtime => CredentialEndpoint::new(url.as_str()),
                };
                endpoint.url = url;
                config.credential_source = CredentialSource::Http(endpoint);
            }
            if let (Some(method), CredentialSource::Http(endpoint)) =
                (method, &mut config.credential_source)
            {
                endpoint.method = method;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.credential_timeout_ms = timeout_ms;
            }
            if !matches!(config.credential_source, CredentialSource::Http(_)) {
                return Err(miette!(
                    "no credential endpoint configured, pass --url or a --config with an http credential source"
                ));
            }
            fetch_key(config, api_version).await
        }
    }
}

async fn replay(input: PathBuf) -> Result<()> {
    let sink = Arc::new(JsonLinesEventSink::new(io::stdout()));
    let bridge = PaymentBridge::new(
        BridgeConfig::default(),
        Arc::new(SimulatedPaymentSdk::default()),
        sink,
    )
    .into_diagnostic()?;
    let adapter = bridge.open_context().into_diagnostic()?;

    let file = File::open(input).into_diagnostic()?;
    let reader = NotificationReader::new(file);
    for notification in reader.notifications() {
        match notification {
            Ok(notification) => notification.deliver(&adapter),
            Err(e) => eprintln!("Error reading notification: {}", e),
        }
    }

    // Shutdown drains every queued event to stdout before returning.
    bridge.shutdown().await.into_diagnostic()
}

async fn fetch_key(config: BridgeConfig, api_version: String) -> Result<()> {
    let bridge = PaymentBridge::new(
        config,
        Arc::new(SimulatedPaymentSdk::default()),
        Arc::new(JsonLinesEventSink::new(io::stderr())),
    )
    .into_diagnostic()?;
    let adapter = bridge.open_context().into_diagnostic()?;

    let (tx, rx) = oneshot::channel();
    adapter.provide(
        &api_version,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    let result = rx
        .await
        .map_err(|_| miette!("credential request was discarded"))?;
    bridge.shutdown().await.into_diagnostic()?;

    match result {
        EphemeralCredentialResult::Success(credential) => {
            let pretty = serde_json::to_string_pretty(&credential).into_diagnostic()?;
            println!("{pretty}");
            Ok(())
        }
        EphemeralCredentialResult::Failure(message) => {
            Err(miette!("failed to retrieve ephemeral key: {message}"))
        }
    }
}
