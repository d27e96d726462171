//! Device token registry

use sqlx::{Row, SqlitePool};

use crate::utils::{collect_res, inspect};
use chime_types::prelude::*;
use chime_types::types::{DeviceToken, Platform};

/// Register a device token. Re-registering an invalidated token revives it.
pub(crate) async fn register(db: &SqlitePool, token: &DeviceToken) -> ChResult<()> {
	sqlx::query(
		"INSERT INTO device_tokens (user_id, platform, token) VALUES (?1, ?2, ?3)
		ON CONFLICT(user_id, platform, token) DO UPDATE SET invalid_at = NULL,
			updated_at = unixepoch()",
	)
	.bind(token.user_id.as_str())
	.bind(token.platform.as_str())
	.bind(&*token.token)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn list(db: &SqlitePool, user_id: &UserId) -> ChResult<Vec<DeviceToken>> {
	let rows = sqlx::query(
		"SELECT platform, token FROM device_tokens
		WHERE user_id = ?1 AND invalid_at IS NULL
		ORDER BY created_at, platform, token",
	)
	.bind(user_id.as_str())
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let tokens = collect_res(rows.iter().map(|row| {
		Ok((row.try_get::<String, _>("platform")?, row.try_get::<String, _>("token")?))
	}))?;
	Ok(tokens
		.into_iter()
		.filter_map(|(platform, token)| match Platform::parse(&platform) {
			Some(platform) => {
				Some(DeviceToken { user_id: user_id.clone(), platform, token: token.into() })
			}
			None => {
				warn!(user_id = %user_id, platform = %platform, "Skipping token with unknown platform");
				None
			}
		})
		.collect())
}

pub(crate) async fn invalidate(db: &SqlitePool, token: &DeviceToken) -> ChResult<()> {
	let res = sqlx::query(
		"UPDATE device_tokens SET invalid_at = unixepoch(), updated_at = unixepoch()
		WHERE user_id = ?1 AND platform = ?2 AND token = ?3 AND invalid_at IS NULL",
	)
	.bind(token.user_id.as_str())
	.bind(token.platform.as_str())
	.bind(&*token.token)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	if res.rows_affected() > 0 {
		info!(user_id = %token.user_id, platform = %token.platform, "Device token invalidated");
	}
	Ok(())
}

// vim: ts=4
