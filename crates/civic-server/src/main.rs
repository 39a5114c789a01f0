//! civic-server binary.
//!
//! Reads `civic.toml` (or the path given with `--config`) layered with
//! `CIVIC_*` environment variables, opens the SQLite store, and serves the
//! API over HTTP. Nested keys use a double underscore, e.g.
//! `CIVIC_AI__API_KEY`.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```text
//! cargo run -p civic-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use civic_actions::Personas;
use civic_api::ApiState;
use civic_core::{collab::TextGenerator, ledger::PointActions};
use civic_server::{
  ServerConfig,
  auth::AuthConfig,
  generator::{HttpGenerator, UnconfiguredGenerator},
  notifier::LogNotifier,
};
use civic_store_sqlite::SqliteStore;
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Civic deliberation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "civic.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CIVIC")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let generator: Arc<dyn TextGenerator> = match &cfg.ai.api_key {
    Some(key) if !key.is_empty() => {
      anyhow::ensure!(!cfg.ai.model.is_empty(), "ai.model is required with ai.api_key");
      Arc::new(
        HttpGenerator::new(&cfg.ai, key.clone())
          .context("failed to build HTTP client")?,
      )
    }
    _ => {
      warn!("no ai.api_key configured; AI features are unavailable");
      Arc::new(UnconfiguredGenerator)
    }
  };

  let actions = if cfg.point_actions.is_empty() {
    PointActions::defaults()
  } else {
    PointActions::new(cfg.point_actions.clone())
  };
  let mut state = ApiState::new(
    Arc::new(store),
    generator,
    Arc::new(LogNotifier),
    Arc::new(actions),
    &cfg.public_url,
  )
  .with_max_tokens(cfg.ai.max_tokens);
  if !cfg.personas.is_empty() {
    state = state.with_personas(Personas::new(cfg.personas.clone()));
  }

  let auth = Arc::new(AuthConfig {
    username:      cfg.admin_username.clone(),
    password_hash: cfg.admin_password_hash.clone(),
  });
  let app = civic_server::router(state, auth);
  let address = format!("{}:{}", cfg.host, cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  match (s.strip_prefix("~/"), std::env::var("HOME")) {
    (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
