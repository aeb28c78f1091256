use std::sync::{Arc, LazyLock};

use clap::{Parser, Subcommand};
use fileshare::{
   Error, FileClient, FileLeaseClient, Result,
   config::{self, Config},
   error::ConfigError,
   transport::{HttpTransport, ResourcePath},
   version,
};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static VERSION_STRING: LazyLock<String> = LazyLock::new(version::version_string);

fn version_string() -> &'static str {
   &VERSION_STRING
}

/// Command-line arguments for the fileshare lease tool
#[derive(Parser)]
#[command(name = "fileshare")]
#[command(about = "Acquire, release, change and break file-share leases")]
#[command(version = version_string())]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Acquire an infinite lease on a file")]
   Acquire {
      #[arg(help = "File as share/path/to/file")]
      file: String,

      #[arg(long, help = "Lease id to propose (default: random UUID)")]
      lease_id: Option<String>,

      #[arg(long, help = "Server-side timeout in seconds")]
      timeout: Option<u32>,
   },

   #[command(about = "Release a lease")]
   Release {
      #[arg(help = "File as share/path/to/file")]
      file: String,

      #[arg(long, help = "Id of the active lease")]
      lease_id: String,

      #[arg(long, help = "Server-side timeout in seconds")]
      timeout: Option<u32>,
   },

   #[command(about = "Change the id of an active lease")]
   Change {
      #[arg(help = "File as share/path/to/file")]
      file: String,

      #[arg(long, help = "Id of the active lease")]
      lease_id: String,

      #[arg(long, help = "New lease id (GUID)")]
      proposed_lease_id: String,

      #[arg(long, help = "Server-side timeout in seconds")]
      timeout: Option<u32>,
   },

   #[command(about = "Break the lease on a file, whoever holds it")]
   Break {
      #[arg(help = "File as share/path/to/file")]
      file: String,

      #[arg(long, help = "Server-side timeout in seconds")]
      timeout: Option<u32>,
   },

   #[command(about = "Show the effective configuration")]
   Config {
      #[arg(long, help = "Write a default config file if none exists")]
      init: bool,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .with_writer(std::io::stderr)
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let cfg = config::get();
   match cli.command {
      Cmd::Acquire { file, lease_id, timeout } => {
         let mut lease = lease_client(cfg, &file, lease_id)?;
         lease.acquire(timeout.or(cfg.lease_timeout_secs)).await?;
         print_json(&serde_json::to_value(lease.snapshot())?)
      },
      Cmd::Release { file, lease_id, timeout } => {
         let mut lease = lease_client(cfg, &file, Some(lease_id))?;
         lease.release(timeout.or(cfg.lease_timeout_secs)).await?;
         print_json(&serde_json::to_value(lease.snapshot())?)
      },
      Cmd::Change { file, lease_id, proposed_lease_id, timeout } => {
         let mut lease = lease_client(cfg, &file, Some(lease_id))?;
         lease
            .change(&proposed_lease_id, timeout.or(cfg.lease_timeout_secs))
            .await?;
         print_json(&serde_json::to_value(lease.snapshot())?)
      },
      Cmd::Break { file, timeout } => {
         let lease = lease_client(cfg, &file, None)?;
         let lease_time = lease.break_lease(timeout.or(cfg.lease_timeout_secs)).await?;
         print_json(&json!({ "path": lease.path().to_string(), "lease_time": lease_time }))
      },
      Cmd::Config { init } => {
         let path = config::config_file_path();
         if init && !path.exists() {
            Config::create_default_config(path)?;
            eprintln!("wrote {}", path.display());
         }
         let mut shown = cfg.clone();
         if shown.sas_token.is_some() {
            shown.sas_token = Some("<redacted>".to_string());
         }
         print!("{}", shown.to_toml()?);
         Ok(())
      },
   }
}

fn lease_client(cfg: &Config, file: &str, lease_id: Option<String>) -> Result<FileLeaseClient> {
   let path = parse_file_arg(file)?;
   let transport = Arc::new(HttpTransport::new(cfg)?);
   FileClient::new(transport, path).lease_client(lease_id)
}

fn parse_file_arg(file: &str) -> Result<ResourcePath> {
   let trimmed = file.trim_matches('/');
   match trimmed.split_once('/') {
      Some((share, path)) if !share.is_empty() && !path.is_empty() => {
         Ok(ResourcePath::new(share, path))
      },
      _ => Err(Error::Config(ConfigError::Invalid(format!(
         "file must be given as share/path, got {file:?}"
      )))),
   }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
   println!("{}", serde_json::to_string_pretty(value)?);
   Ok(())
}
