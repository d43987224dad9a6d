mod config;
mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::*;
use simulate::*;

#[derive(Parser, Clone)]
pub struct Cli {
	#[command(flatten)]
	log: maple_native::Log,

	/// Load settings from this TOML file; command line flags are ignored when set.
	#[arg(long, env = "MAPLE_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Run a server and client session against each other over a simulated link.
	Simulate {
		#[command(flatten)]
		sync: maple_sync::SyncConfig,

		#[command(flatten)]
		link: LinkArgs,

		/// How long to run.
		#[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
		duration: std::time::Duration,
	},

	/// Print the effective configuration as TOML.
	Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let file = match &cli.config {
		Some(path) => Some(maple_native::Config::load(path)?),
		None => None,
	};

	match &file {
		Some(file) => file.log.init(),
		None => cli.log.init(),
	}

	match cli.command {
		Command::Simulate { sync, link, duration } => {
			let (sync, device) = match file {
				Some(file) => (file.sync, file.device),
				None => (sync, Default::default()),
			};
			sync.validate()?;
			simulate(sync, device, link, duration).await
		}
		Command::Config => print_config(file.unwrap_or_default()),
	}
}
