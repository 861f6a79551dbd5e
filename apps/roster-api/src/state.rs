use std::sync::Arc;

use roster_service::RosterService;
use roster_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RosterService>,
}
impl AppState {
	pub async fn new(config: roster_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.vector_dim).await?;

		let service = RosterService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
