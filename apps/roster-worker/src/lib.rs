pub mod worker;

mod error;

pub use error::{Error, Result};

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
	version = roster_cli::VERSION,
	rename_all = "kebab",
	styles = roster_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = roster_config::load(&args.config)?;
	let filter = EnvFilter::try_new(&config.service.log_level)
		.unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = roster_storage::db::Db::connect(&config.storage.postgres).await?;
	db.ensure_schema(config.storage.vector_dim).await?;

	let state = worker::WorkerState { db, cfg: config };

	worker::run_worker(state).await
}
