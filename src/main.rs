use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use lms_client::app::{App, Exit};
use lms_client::cache::{MemoryStorage, SqliteStorage};
use lms_client::config::{self, Config};
use lms_client::lms::Services;
use lms_client::logging::{self, LogTarget};
use lms_client::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "lms")]
#[command(about = "A terminal client for the learning platform")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./lms.yaml, then $XDG_CONFIG_HOME/lms/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep storage in memory; nothing survives the process
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Open the terminal UI (default)
  Tui,
  /// Sign in and store the session
  Login {
    /// Account email (default: $LMS_EMAIL); the password is read from $LMS_PASSWORD
    #[arg(short, long)]
    email: Option<String>,
  },
  /// Forget the stored session
  Logout,
  /// Run the sync agent without a UI
  Sync {
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let command = args.command.unwrap_or(Cmd::Tui);

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let target = match command {
    Cmd::Sync { .. } => LogTarget::Stderr,
    _ => LogTarget::File,
  };
  let _log_guard = logging::init(target, &config.log_level, &config::data_dir()?)?;

  let services = if args.ephemeral {
    let storage = Arc::new(MemoryStorage::new());
    Services::new(&config, storage.clone(), storage)
  } else {
    let storage = Arc::new(SqliteStorage::open_default()?);
    Services::new(&config, storage.clone(), storage)
  };
  let services = services.map_err(|e| eyre!("Failed to set up HTTP clients: {}", e))?;

  match command {
    Cmd::Tui => run_tui(&config, services).await,
    Cmd::Login { email } => login(services, email).await,
    Cmd::Logout => {
      services.auth.logout();
      println!("Signed out.");
      Ok(())
    }
    Cmd::Sync { once } => run_sync(&config, services, once).await,
  }
}

async fn run_tui(config: &Config, services: Services) -> Result<()> {
  if !services.session.is_authenticated() && !services.session.awaiting_refresh() {
    return Err(eyre!("Not signed in. Run `lms login` first."));
  }

  let runtime = Runtime::start(config, services).await?;
  // an expired token is refreshed during startup, and may be rejected
  if !runtime.services.session.is_authenticated() {
    runtime.shutdown().await;
    return Err(eyre!("Session expired. Run `lms login` again."));
  }

  let app = App::new(config, runtime)?;
  if app.run().await? == Exit::SignedOut {
    println!("Signed out.");
  }
  Ok(())
}

async fn login(services: Services, email: Option<String>) -> Result<()> {
  let (email, password) = match email {
    Some(email) => {
      let password = std::env::var("LMS_PASSWORD")
        .map_err(|_| eyre!("Password not found. Set LMS_PASSWORD environment variable."))?;
      (email, password)
    }
    None => Config::get_credentials()?,
  };

  let user = services
    .auth
    .login(&email, &password, true)
    .await
    .map_err(|e| eyre!("Login failed: {}", e))?;
  println!("Signed in as {} <{}>", user.full_name(), user.email);
  Ok(())
}

async fn run_sync(config: &Config, services: Services, once: bool) -> Result<()> {
  if !services.session.is_authenticated() && !services.session.awaiting_refresh() {
    tracing::warn!("no stored session, only public data will sync");
  }

  let runtime = Runtime::start(config, services).await?;

  if once {
    let result = runtime.sync.force_sync_all().await;
    runtime.shutdown().await;
    return result.map_err(|e| eyre!("Sync failed: {}", e));
  }

  tracing::info!("sync agent running, press Ctrl-C to stop");
  tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
  runtime.shutdown().await;
  Ok(())
}
