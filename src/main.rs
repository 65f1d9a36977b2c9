mod commands;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use ledgerline::api::{AuthClient, HttpTransport, LogoutReason};
use ledgerline::config::Config;
use ledgerline::session::Session;
use ledgerline::tracker::Tracker;

#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(about = "Command-line client for the budget tracker API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ledgerline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long, global = true)]
  api_url: Option<String>,

  /// Mirror logs to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose)?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(api_url) = args.api_url {
    config.api.base_url = api_url;
  }
  info!(base_url = %config.api.base_url, "starting");

  let session = Session::from_config(&config.session)?;
  let transport = HttpTransport::new(&config.api.base_url, config.api.timeout())?;

  let login_url = config.login_url.clone();
  let client = AuthClient::new(Arc::new(transport), session).with_logout_hook(move |reason| {
    if reason == LogoutReason::RefreshFailed {
      warn!("session expired");
      eprintln!("Session expired. Log in again ({}): ledgerline login --email <EMAIL>", login_url);
    }
  });

  let tracker = Tracker::new(client);
  commands::run(&tracker, args.command).await?;

  Ok(())
}
