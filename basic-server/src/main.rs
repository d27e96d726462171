use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use chime::prelude::*;
use chime::push::{FcmGateway, VapidKey, WebPushGateway};
use chime::settings::ReminderConfig;
use chime::AppBuilder;
use chime_store_adapter_sqlite::StoreAdapterSqlite;

pub struct Config {
	pub db_path: PathBuf,
	pub vapid_private_key: Option<String>,
	pub vapid_subject: Option<String>,
	pub fcm_project: Option<String>,
	pub fcm_access_token: Option<String>,
	pub once: bool,
}

impl Config {
	fn from_env() -> Self {
		let var = |key: &str| env::var(key).ok().filter(|value| !value.is_empty());
		Config {
			db_path: PathBuf::from(var("CHIME_DB").unwrap_or_else(|| "./data".to_string())),
			vapid_private_key: var("CHIME_VAPID_PRIVATE_KEY"),
			vapid_subject: var("CHIME_VAPID_SUBJECT"),
			fcm_project: var("CHIME_FCM_PROJECT"),
			fcm_access_token: var("CHIME_FCM_ACCESS_TOKEN"),
			once: var("CHIME_ONCE").is_some_and(|value| value != "0"),
		}
	}
}

async fn run(config: Config) -> ChResult<()> {
	let mut builder = AppBuilder::new();

	if tokio::fs::metadata(&config.db_path).await.is_err() && config.db_path.extension().is_none() {
		tokio::fs::create_dir_all(&config.db_path).await?;
	}
	let store = Arc::new(StoreAdapterSqlite::new(&config.db_path).await?);
	builder.config(ReminderConfig::from_env()?).store(store);

	match (config.vapid_private_key, config.vapid_subject) {
		(Some(private_key), Some(subject)) => {
			let vapid = VapidKey::from_private(&private_key)?;
			info!("Web Push enabled, VAPID public key: {}", vapid.public_key());
			builder.gateway(Arc::new(WebPushGateway::new(vapid, subject)?));
		}
		(Some(_), None) => {
			return Err(Error::ConfigError("CHIME_VAPID_SUBJECT is required for Web Push".into()));
		}
		_ => info!("Web Push disabled"),
	}
	match (config.fcm_project, config.fcm_access_token) {
		(Some(project), Some(token)) => {
			info!("FCM enabled for project {}", project);
			builder.gateway(Arc::new(FcmGateway::new(project, token)?));
		}
		(Some(_), None) => {
			return Err(Error::ConfigError("CHIME_FCM_ACCESS_TOKEN is required for FCM".into()));
		}
		_ => info!("FCM disabled"),
	}

	let engine = builder.build()?;
	if config.once {
		let report = engine.tick().await?;
		println!("{}", serde_json::to_string(&report)?);
		return Ok(());
	}

	engine
		.run(async {
			if let Err(err) = tokio::signal::ctrl_c().await {
				error!("Cannot listen for shutdown signal: {}", err);
				std::future::pending::<()>().await;
			}
		})
		.await
}

#[tokio::main]
async fn main() -> ExitCode {
	match run(Config::from_env()).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("FATAL: {}", err);
			eprintln!("chime: {}", err);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
