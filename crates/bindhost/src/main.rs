//! Headless demo host: binds a few objects, plays a scripted UI against them
//! over an in-process channel and shuts down when the script ends.

mod notes;
mod surface;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bindrun::Args;
use bindrun::Bridge;
use bindrun::BridgeConfig;
use bindrun::ChannelTransport;
use bindrun::Client;
use bindrun::Functions;
use bindrun::InvokeError;
use bindrun::MethodSpec;
use bindwire::Kind;
use bindwire::Value;

use crate::notes::Notes;
use crate::surface::ScriptedUi;

#[derive(Parser)]
#[command(name = "bindhost")]
#[command(version, about = "Run the bridge against a scripted headless UI", long_about = None)]
struct Cli {
    /// Bridge configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the catalog manifest here at registration
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            BridgeConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };
    if let Some(path) = cli.manifest {
        config = config.manifest_path(path);
    }

    let builder = Bridge::builder().config(config.clone());
    let notes = Notes::new(builder.events());
    let bridge = builder
        .bind(notes)
        .bind(math())
        .bind(clock())
        .before_start(|| tracing::info!("ui about to load"))
        .on_close(|| tracing::info!("host cleanup done"))
        .build()
        .context("registering bound objects")?;

    for (qualifier, schema) in &bridge.catalog().objects {
        tracing::info!(object = %qualifier, methods = ?schema.method_names(), "bound");
    }

    let (host, ui) = ChannelTransport::pair();
    let surface = ScriptedUi::new(Client::new(ui).with_config(&config));
    bridge.run(host, &surface).await?;
    tracing::info!(state = %bridge.state(), "bridge finished");
    Ok(())
}

async fn add(args: Args) -> Result<Value, InvokeError> {
    let a: i64 = args.decode(0)?;
    let b: i64 = args.decode(1)?;
    a.checked_add(b).map(Value::Int).ok_or_else(|| InvokeError::new("integer overflow"))
}

async fn div(args: Args) -> Result<Value, InvokeError> {
    let a: f64 = args.decode(0)?;
    let b: f64 = args.decode(1)?;
    if b == 0.0 {
        return Err(InvokeError::new("division by zero"));
    }
    Ok(Value::Float(a / b))
}

fn math() -> Functions {
    Functions::new("math")
        .func(
            MethodSpec::new("add")
                .param("a", Kind::Integer)
                .param("b", Kind::Integer)
                .returns(Kind::Integer),
            add,
        )
        .func(
            MethodSpec::new("div")
                .param("a", Kind::Float)
                .param("b", Kind::Float)
                .returns(Kind::Float),
            div,
        )
}

async fn now(_args: Args) -> Result<Value, InvokeError> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    millis(elapsed).map(Value::Int)
}

fn millis(elapsed: Duration) -> Result<i64, InvokeError> {
    i64::try_from(elapsed.as_millis()).map_err(|_| InvokeError::new("clock reading does not fit in an integer"))
}

fn clock() -> Functions {
    Functions::new("clock").func(MethodSpec::new("now").returns(Kind::Integer), now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_in_range() {
        assert_eq!(millis(Duration::from_millis(1_700_000_000_123)).unwrap(), 1_700_000_000_123);
    }

    #[test]
    fn test_millis_overflow_is_an_error() {
        let err = millis(Duration::MAX).unwrap_err();
        assert_eq!(err.message(), "clock reading does not fit in an integer");
    }
}
