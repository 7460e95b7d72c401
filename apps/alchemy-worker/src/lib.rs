pub mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use alchemy_domain::ranking::Weights;
use alchemy_service::{AlchemyService, TrainingRequest};
use alchemy_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = alchemy_cli::VERSION,
	rename_all = "kebab",
	styles = alchemy_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run the maintenance and training schedule until interrupted.
	Run,
	/// Run every lifecycle pass once and print the report.
	Maintain {
		/// Report what would change without writing anything.
		#[arg(long)]
		dry_run: bool,
	},
	/// Run one training pass and print the report.
	Train {
		/// Train even when fewer than `learning.min_samples` events are pending.
		#[arg(long)]
		force: bool,
		#[arg(long)]
		dry_run: bool,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = alchemy_config::load(&args.config)?;
	init_tracing(&config)?;
	let db = Db::connect(&config.storage.sqlite).await?;
	db.ensure_schema(Weights::from(config.ranking.weights), OffsetDateTime::now_utc()).await?;
	let service = AlchemyService::new(config, db);

	match args.command {
		Command::Run => worker::run_worker(worker::WorkerState::new(service)).await,
		Command::Maintain { dry_run } => {
			let report = service.run_lifecycle_maintenance(dry_run).await;

			print_json(&report)
		},
		Command::Train { force, dry_run } => {
			let report = service.run_training(TrainingRequest { force, dry_run }).await?;

			print_json(&report)
		},
	}
}

fn init_tracing(config: &alchemy_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
	Ok(())
}

fn print_json<T>(report: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	println!("{}", serde_json::to_string_pretty(report)?);

	Ok(())
}
