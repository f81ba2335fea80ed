mod app;
mod cache;
mod clock;
mod config;
mod dex;
mod error;
mod items;
mod query;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dexq")]
#[command(about = "Creature catalog demo with a stale-while-revalidate query cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./dexq.yaml, then $XDG_CONFIG_HOME/dexq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Timezone for the polled clock line
  #[arg(short, long)]
  timezone: Option<String>,

  /// RNG seed for the mock store's failure injection
  #[arg(short, long)]
  seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  // Log to stderr so the demo's stdout stays readable; RUST_LOG filters.
  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(writer)
    .init();

  let args = Args::parse();

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(timezone) = args.timezone {
    config.clock.timezone = timezone;
  }
  if let Some(seed) = args.seed {
    config.store.seed = Some(seed);
  }

  let mut app = app::App::new(config.clone())?;
  app.run(&config).await?;

  Ok(())
}
