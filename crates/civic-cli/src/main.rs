//! `civic` — command-line client for the civic deliberation API.
//!
//! # Usage
//!
//! ```text
//! civic --url http://localhost:8080 --session my-laptop ideas add "Fix Elm St"
//! civic --config ~/.config/civic/config.toml groups list --mine
//! ```

mod client;

use anyhow::{Context, Result};
use chrono::Local;
use civic_core::{
  group::Group,
  idea::Idea,
  ids::{GroupId, IdeaId},
};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "civic", about = "Command-line client for the civic API")]
struct Args {
  /// Path to a TOML config file (url, token, session).
  #[arg(short, long, value_name = "FILE")]
  config: Option<std::path::PathBuf>,

  /// Base URL of the civic server (default: http://localhost:8080).
  #[arg(long, env = "CIVIC_URL")]
  url: Option<String>,

  /// Device token issued at signup.
  #[arg(long, env = "CIVIC_TOKEN")]
  token: Option<String>,

  /// Anonymous session id, used when no token is given.
  #[arg(long, env = "CIVIC_SESSION")]
  session: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show who the server thinks you are.
  Me,
  /// Create an account, claiming the current session's points.
  Signup {
    handle: String,
    #[arg(long)]
    email:  Option<String>,
  },
  /// Show the points balance and recent awards.
  Points {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// Move the session's points onto the signed-in account.
  Claim,
  #[command(subcommand)]
  Ideas(IdeaCommand),
  #[command(subcommand)]
  Groups(GroupCommand),
  /// Talk to a persona.
  Chat {
    message:  String,
    #[arg(long)]
    persona:  Option<String>,
    #[arg(long)]
    group:    Option<i64>,
  },
}

#[derive(Subcommand, Debug)]
enum IdeaCommand {
  /// Your personal ideas, or a group's.
  List {
    #[arg(long)]
    group: Option<i64>,
  },
  Show {
    id: i64,
  },
  Add {
    content:  String,
    #[arg(long)]
    group:    Option<i64>,
    #[arg(long)]
    parent:   Option<i64>,
    #[arg(long)]
    category: Option<String>,
    /// Comma-separated.
    #[arg(long)]
    tags:     Option<String>,
  },
  Promote {
    id:     i64,
    status: String,
  },
  Vote {
    id:   i64,
    /// `up` or `down`.
    vote: String,
  },
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
  List {
    #[arg(long)]
    mine: bool,
  },
  Create {
    name:        String,
    #[arg(long, default_value = "")]
    description: String,
    /// `open`, `observable` or `closed`.
    #[arg(long, default_value = "open")]
    access:      String,
  },
  Join {
    id: i64,
  },
  Invite {
    id:     i64,
    emails: Vec<String>,
  },
  /// Cluster the group's ideas into digests.
  Gather {
    id: i64,
  },
  /// Write the group's proposal.
  Crystallize {
    id: i64,
  },
  /// Which digests and proposals have outdated sources.
  Staleness {
    id: i64,
  },
}

// ─── Config file ─────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:     String,
  #[serde(default)]
  token:   Option<String>,
  #[serde(default)]
  session: Option<String>,
}

// ─── Output ──────────────────────────────────────────────────────────────────

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn idea_line(idea: &Idea) -> String {
  let clerk = idea
    .clerk_key
    .as_deref()
    .map(|key| format!(" [{key}]"))
    .unwrap_or_default();
  format!(
    "#{:<5} {:<10} {:<10} {} {}{}",
    idea.id,
    idea.category,
    idea.status,
    idea.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
    idea.content.lines().next().unwrap_or_default(),
    clerk,
  )
}

fn group_line(group: &Group) -> String {
  format!(
    "#{:<5} {:<13} {:<10} {}",
    group.group_id, group.status, group.access_level, group.name
  )
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    token:    args.token.or(file_cfg.token),
    session:  args.session.or(file_cfg.session),
  };
  let client = ApiClient::new(api_config)?;

  run(&client, args.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
  match command {
    Command::Me => print_json(&client.me().await?),
    Command::Signup { handle, email } => {
      let signup = client.signup(&handle, email.as_deref()).await?;
      print_json(&signup)?;
      eprintln!("Save the session token; it is not shown again.");
      Ok(())
    }
    Command::Points { limit } => print_json(&client.points(limit).await?),
    Command::Claim => print_json(&client.claim().await?),
    Command::Ideas(cmd) => ideas(client, cmd).await,
    Command::Groups(cmd) => groups(client, cmd).await,
    Command::Chat { message, persona, group } => {
      let body = json!({ "message": message, "persona": persona, "group_id": group });
      let reply = client.chat(&body).await?;
      match reply["error"].as_str() {
        Some(err) => eprintln!("persona unavailable: {err}"),
        None => println!("{}", reply["text"].as_str().unwrap_or_default()),
      }
      for action in reply["actions"].as_array().into_iter().flatten() {
        eprintln!(
          "  {} {}",
          if action["success"] == true { "✓" } else { "✗" },
          action["action"].as_str().unwrap_or("?"),
        );
      }
      Ok(())
    }
  }
}

async fn ideas(client: &ApiClient, cmd: IdeaCommand) -> Result<()> {
  match cmd {
    IdeaCommand::List { group } => {
      let page = client.list_ideas(group.map(GroupId)).await?;
      for idea in &page.items {
        println!("{}", idea_line(idea));
      }
      eprintln!("{} of {}", page.items.len(), page.total);
      Ok(())
    }
    IdeaCommand::Show { id } => {
      let idea = client.get_idea(IdeaId(id)).await?;
      println!("{}\n\n{}", idea_line(&idea), idea.content);
      if !idea.tags.is_empty() {
        println!("\ntags: {}", idea.tags.join(", "));
      }
      for reply in client.thread(IdeaId(id)).await? {
        println!("  ↳ {}", idea_line(&reply));
      }
      Ok(())
    }
    IdeaCommand::Add { content, group, parent, category, tags } => {
      let tags: Vec<&str> = tags
        .as_deref()
        .map(|t| t.split(',').map(str::trim).collect())
        .unwrap_or_default();
      let body = json!({
        "content": content,
        "group_id": group,
        "parent_id": parent,
        "category": category,
        "tags": tags,
        "source": "api",
      });
      print_json(&client.add_idea(&body).await?)
    }
    IdeaCommand::Promote { id, status } => {
      print_json(&client.promote(IdeaId(id), &status).await?)
    }
    IdeaCommand::Vote { id, vote } => print_json(&client.vote(IdeaId(id), &vote).await?),
  }
}

async fn groups(client: &ApiClient, cmd: GroupCommand) -> Result<()> {
  match cmd {
    GroupCommand::List { mine } => {
      let page = client.list_groups(mine).await?;
      for group in &page.items {
        println!("{}", group_line(group));
      }
      eprintln!("{} of {}", page.items.len(), page.total);
      Ok(())
    }
    GroupCommand::Create { name, description, access } => {
      let body = json!({
        "name": name,
        "description": description,
        "access_level": access,
      });
      print_json(&client.create_group(&body).await?)
    }
    GroupCommand::Join { id } => print_json(&client.join(GroupId(id)).await?),
    GroupCommand::Invite { id, emails } => {
      print_json(&client.invite(GroupId(id), &emails).await?)
    }
    GroupCommand::Gather { id } => {
      let gathered = client.gather(GroupId(id)).await?;
      let digests = gathered["digests"].as_array().map_or(0, Vec::len);
      eprintln!("{digests} new digest(s)");
      print_json(&gathered)
    }
    GroupCommand::Crystallize { id } => {
      let proposal = client.crystallize(GroupId(id)).await?;
      println!("{}\n\n{}", idea_line(&proposal), proposal.content);
      Ok(())
    }
    GroupCommand::Staleness { id } => print_json(&client.staleness(GroupId(id)).await?),
  }
}
