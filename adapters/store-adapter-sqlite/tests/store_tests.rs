//! SQLite store tests
//!
//! Covers fire-window reads, the token registry, and the ledger's claim
//! protocol including concurrent claims on one database file.

use chime_store_adapter_sqlite::StoreAdapterSqlite;
use chime_types::error::Error;
use chime_types::event_adapter::EventAdapter;
use chime_types::ledger_adapter::LedgerAdapter;
use chime_types::token_adapter::TokenAdapter;
use chime_types::types::{
	CommitResult, DeliveryStatus, DeviceToken, Event, FireWindow, HolderId, Platform,
	ReminderTask, TaskId, TaskOutcome, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const S: i64 = 1_700_000_000;
const LEASE: Duration = Duration::from_secs(120);

async fn create_test_store() -> (StoreAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let store = StoreAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create store");
	(store, temp_dir)
}

fn event(id: &str, start: i64, reminders: &[i64], invitees: &[&str]) -> Event {
	Event {
		event_id: id.into(),
		owner_id: "alice".into(),
		title: format!("Event {}", id).into(),
		start_at: Timestamp(start),
		timezone: "Europe/Budapest".into(),
		reminders: reminders.to_vec(),
		invitees: invitees.iter().map(|&u| u.into()).collect(),
	}
}

fn task(ev: &Event, offset: i64) -> ReminderTask {
	ReminderTask::new(Arc::new(ev.clone()), offset)
}

fn holder(name: &str) -> HolderId {
	name.into()
}

#[tokio::test]
async fn test_read_event_roundtrip() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[1800, 600], &["bob", "carol"]);
	store.upsert_event(&ev).await.expect("Should upsert event");

	let read = store.read_event(&"ev1".into()).await.expect("Should read event");
	assert_eq!(read, ev);

	let missing = store.read_event(&"nope".into()).await;
	assert!(matches!(missing, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_fire_window_bounds() {
	let (store, _temp) = create_test_store().await;
	store.upsert_event(&event("ev1", S, &[1800, 600], &[])).await.unwrap();
	store.upsert_event(&event("ev2", S + 60, &[600], &[])).await.unwrap();

	// (S - 1800, S - 600]: excludes the 1800 reminder, includes ev1@600
	let window = FireWindow { after: Timestamp(S - 1800), until: Timestamp(S - 600) };
	let due = store.query_by_fire_window(window).await.unwrap();
	assert_eq!(due.len(), 1);
	assert_eq!(due[0].event.event_id.as_str(), "ev1");
	assert_eq!(due[0].offset_secs, 600);

	let window = FireWindow { after: Timestamp(S - 1801), until: Timestamp(S - 540) };
	let due = store.query_by_fire_window(window).await.unwrap();
	let pairs: Vec<(&str, i64)> =
		due.iter().map(|r| (r.event.event_id.as_str(), r.offset_secs)).collect();
	assert_eq!(pairs, vec![("ev1", 1800), ("ev1", 600), ("ev2", 600)]);
	// Reminders of one event share the loaded event
	assert!(Arc::ptr_eq(&due[0].event, &due[1].event));

	let empty = FireWindow { after: Timestamp(S), until: Timestamp(S + 10) };
	assert!(store.query_by_fire_window(empty).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_replaces_reminders() {
	let (store, _temp) = create_test_store().await;
	store.upsert_event(&event("ev1", S, &[1800], &["bob"])).await.unwrap();
	store.upsert_event(&event("ev1", S + 3600, &[600, 600], &[])).await.unwrap();

	let read = store.read_event(&"ev1".into()).await.unwrap();
	assert_eq!(read.start_at, Timestamp(S + 3600));
	assert_eq!(read.reminders, vec![600]);
	assert!(read.invitees.is_empty());

	let old = FireWindow { after: Timestamp(S - 1801), until: Timestamp(S - 1800) };
	assert!(store.query_by_fire_window(old).await.unwrap().is_empty());

	store.delete_event(&"ev1".into()).await.unwrap();
	assert!(matches!(store.read_event(&"ev1".into()).await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_token_register_invalidate_revive() {
	let (store, _temp) = create_test_store().await;
	let web = DeviceToken { user_id: "alice".into(), platform: Platform::WebPush, token: "w1".into() };
	let fcm = DeviceToken { user_id: "alice".into(), platform: Platform::Fcm, token: "f1".into() };
	store.register_token(&web).await.unwrap();
	store.register_token(&fcm).await.unwrap();
	store.register_token(&fcm).await.unwrap();

	let tokens = store.tokens_for(&"alice".into()).await.unwrap();
	assert_eq!(tokens.len(), 2);
	assert!(tokens.contains(&web) && tokens.contains(&fcm));
	assert!(store.tokens_for(&"bob".into()).await.unwrap().is_empty());

	store.invalidate(&fcm).await.unwrap();
	assert_eq!(store.tokens_for(&"alice".into()).await.unwrap(), vec![web.clone()]);

	store.register_token(&fcm).await.unwrap();
	assert_eq!(store.tokens_for(&"alice".into()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_claim_is_exclusive_until_lease_expires() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[600], &[]);
	let t = task(&ev, 600);
	let now = Timestamp(S - 600);

	assert!(store.claim(&t, &holder("h1"), LEASE, now).await.unwrap());
	assert!(!store.claim(&t, &holder("h2"), LEASE, now.add_secs(119)).await.unwrap());

	// Reclaimable exactly at T + L
	let expiry = now.add_duration(LEASE);
	assert!(store.claim(&t, &holder("h2"), LEASE, expiry).await.unwrap());

	let records = store.read(std::slice::from_ref(&t.task_id)).await.unwrap();
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].status, DeliveryStatus::Claimed);
	assert_eq!(records[0].holder, Some(holder("h2")));
	assert_eq!(records[0].attempts, 2);
	assert_eq!(records[0].claim_expires_at, Some(expiry.add_duration(LEASE)));
	assert_eq!(records[0].fire_at, Timestamp(S - 600));
}

#[tokio::test]
async fn test_stale_commit_is_discarded() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[600], &[]);
	let t = task(&ev, 600);
	let now = Timestamp(S - 600);

	store.claim(&t, &holder("h1"), LEASE, now).await.unwrap();
	let later = now.add_duration(LEASE);
	store.claim(&t, &holder("h2"), LEASE, later).await.unwrap();

	let res = store
		.commit(&t.task_id, &holder("h1"), TaskOutcome::Sent, None, later.add_secs(1))
		.await
		.unwrap();
	assert_eq!(res, CommitResult::Stale);

	let res = store
		.commit(&t.task_id, &holder("h2"), TaskOutcome::Sent, None, later.add_secs(1))
		.await
		.unwrap();
	assert_eq!(res, CommitResult::Committed);

	// Terminal records are never claimed again
	let far = later.add_secs(10_000);
	assert!(!store.claim(&t, &holder("h3"), LEASE, far).await.unwrap());
	let records = store.read(std::slice::from_ref(&t.task_id)).await.unwrap();
	assert_eq!(records[0].status, DeliveryStatus::Sent);
	assert!(records[0].effective_status(far).is_terminal());
}

#[tokio::test]
async fn test_commit_after_own_lease_expired_is_stale() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[600], &[]);
	let t = task(&ev, 600);
	let now = Timestamp(S - 600);

	store.claim(&t, &holder("h1"), LEASE, now).await.unwrap();
	let res = store
		.commit(&t.task_id, &holder("h1"), TaskOutcome::Failed, Some("timeout"), now.add_duration(LEASE))
		.await
		.unwrap();
	assert_eq!(res, CommitResult::Stale);
}

#[tokio::test]
async fn test_release_shortens_claim() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[600], &[]);
	let t = task(&ev, 600);
	let now = Timestamp(S - 600);

	store.claim(&t, &holder("h1"), LEASE, now).await.unwrap();
	assert!(!store.release(&t.task_id, &holder("h2"), now.add_secs(5), None, now).await.unwrap());
	assert!(
		store
			.release(&t.task_id, &holder("h1"), now.add_secs(5), Some("unavailable"), now)
			.await
			.unwrap()
	);

	let records = store.read(std::slice::from_ref(&t.task_id)).await.unwrap();
	assert_eq!(records[0].claim_expires_at, Some(now.add_secs(5)));
	assert_eq!(records[0].last_error.as_deref(), Some("unavailable"));
	assert!(!store.claim(&t, &holder("h2"), LEASE, now.add_secs(4)).await.unwrap());
	assert!(store.claim(&t, &holder("h2"), LEASE, now.add_secs(5)).await.unwrap());
}

#[tokio::test]
async fn test_read_omits_missing_tasks() {
	let (store, _temp) = create_test_store().await;
	let ev = event("ev1", S, &[1800, 600], &[]);
	let now = Timestamp(S - 600);
	store.claim(&task(&ev, 600), &holder("h1"), LEASE, now).await.unwrap();

	let mut ids: Vec<TaskId> = (0..1200).map(|i| TaskId::from(format!("missing-{}", i))).collect();
	ids.push(task(&ev, 600).task_id);
	ids.push(task(&ev, 1800).task_id);

	let records = store.read(&ids).await.unwrap();
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].task_id, task(&ev, 600).task_id);
	assert!(store.read(&[]).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_grant_one_holder() {
	let (store, _temp) = create_test_store().await;
	let store = Arc::new(store);
	let ev = event("ev1", S, &[600], &[]);
	let t = task(&ev, 600);
	let now = Timestamp(S - 600);

	let handles: Vec<_> = (0..8)
		.map(|i| {
			let store = store.clone();
			let t = t.clone();
			tokio::spawn(async move {
				store.claim(&t, &HolderId::from(format!("h{}", i)), LEASE, now).await.unwrap()
			})
		})
		.collect();

	let mut granted = 0;
	for handle in handles {
		if handle.await.unwrap() {
			granted += 1;
		}
	}
	assert_eq!(granted, 1);

	let records = store.read(std::slice::from_ref(&t.task_id)).await.unwrap();
	assert_eq!(records[0].attempts, 1);
}

#[tokio::test]
async fn test_reopen_keeps_data() {
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("reminders.db");
	{
		let store = StoreAdapterSqlite::new(&path).await.unwrap();
		store.upsert_event(&event("ev1", S, &[600], &[])).await.unwrap();
	}
	let store = StoreAdapterSqlite::new(&path).await.unwrap();
	assert_eq!(store.read_event(&"ev1".into()).await.unwrap().reminders, vec![600]);
}

#[tokio::test]
async fn test_schema_version_recorded() {
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("reminders.db");
	drop(StoreAdapterSqlite::new(&path).await.unwrap());
	drop(StoreAdapterSqlite::new(&path).await.unwrap());

	let opts = sqlx::sqlite::SqliteConnectOptions::new().filename(&path);
	let pool = sqlx::SqlitePool::connect_with(opts).await.unwrap();
	let version: String = sqlx::query_scalar("SELECT value FROM vars WHERE key = 'db_version'")
		.fetch_one(&pool)
		.await
		.unwrap();
	assert_eq!(version, "1");
	let columns: Vec<String> =
		sqlx::query_scalar("SELECT name FROM pragma_table_info('device_tokens')")
			.fetch_all(&pool)
			.await
			.unwrap();
	assert!(columns.iter().any(|c| c == "invalid_at"));
}

// vim: ts=4
