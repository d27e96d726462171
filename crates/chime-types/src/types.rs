//! Common types used throughout the Chime engine.

use serde::{Deserialize, Serialize};
use std::{
	fmt,
	sync::Arc,
	time::{Duration, SystemTime},
};

use crate::hasher;

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn add_secs(self, secs: i64) -> Self {
		Timestamp(self.0.saturating_add(secs))
	}

	pub fn sub_secs(self, secs: i64) -> Self {
		Timestamp(self.0.saturating_sub(secs))
	}

	pub fn add_duration(self, duration: Duration) -> Self {
		self.add_secs(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
	}

	pub fn sub_duration(self, duration: Duration) -> Self {
		self.sub_secs(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

pub fn now() -> Timestamp {
	let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
	Timestamp(i64::try_from(res.as_secs()).unwrap_or(i64::MAX))
}

// Clock //
//*******//
/// Source of the current time. Every invocation reads time through this so
/// lease arithmetic can be tested without sleeping.
pub trait Clock: fmt::Debug + Send + Sync {
	fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		now()
	}
}

/// Manually advanced clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
	current: parking_lot::Mutex<Timestamp>,
}

impl ManualClock {
	pub fn new(start: Timestamp) -> Arc<Self> {
		Arc::new(Self { current: parking_lot::Mutex::new(start) })
	}

	pub fn set(&self, ts: Timestamp) {
		*self.current.lock() = ts;
	}

	pub fn advance(&self, secs: i64) {
		let mut current = self.current.lock();
		*current = current.add_secs(secs);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		*self.current.lock()
	}
}

// Identifiers //
//*************//
macro_rules! string_id {
	($name:ident) => {
		#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub Box<str>);

		impl $name {
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(s: &str) -> Self {
				Self(s.into())
			}
		}

		impl From<String> for $name {
			fn from(s: String) -> Self {
				Self(s.into_boxed_str())
			}
		}
	};
}

string_id!(EventId);
string_id!(UserId);
string_id!(TaskId);
string_id!(HolderId);

impl TaskId {
	/// Deterministic task identifier for one reminder of one event.
	///
	/// Recomputing the id for the same (event, offset) pair always yields the
	/// same value; a different offset yields a different task.
	pub fn for_reminder(event_id: &EventId, offset_secs: i64) -> Self {
		let mut hasher = hasher::Hasher::new();
		hasher.update(event_id.as_str().as_bytes());
		hasher.update(&[0]);
		hasher.update(&offset_secs.to_be_bytes());
		TaskId(hasher.finalize("r").into_boxed_str())
	}
}

// Events //
//********//
/// Calendar event as exposed by the event store. Read-only to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	pub event_id: EventId,
	pub owner_id: UserId,
	pub title: Box<str>,
	pub start_at: Timestamp,
	/// IANA timezone name of the event, passed through to clients
	pub timezone: Box<str>,
	/// Reminder offsets in seconds before `start_at`, in display order
	pub reminders: Vec<i64>,
	#[serde(default)]
	pub invitees: Vec<UserId>,
}

impl Event {
	/// Owner followed by invitees, without duplicates
	pub fn audience(&self) -> Vec<UserId> {
		let mut audience: Vec<UserId> = Vec::with_capacity(self.invitees.len() + 1);
		for user in std::iter::once(&self.owner_id).chain(self.invitees.iter()) {
			if !audience.contains(user) {
				audience.push(user.clone());
			}
		}
		audience
	}

	pub fn fire_at(&self, offset_secs: i64) -> Timestamp {
		self.start_at.sub_secs(offset_secs)
	}
}

/// One (event, reminder offset) pair returned by the event store
#[derive(Clone, Debug)]
pub struct EventReminder {
	pub event: Arc<Event>,
	pub offset_secs: i64,
}

/// Fire-time window `(after, until]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FireWindow {
	pub after: Timestamp,
	pub until: Timestamp,
}

impl FireWindow {
	/// Window of reminders due at `now`: fire time in `(now - lookahead, now]`
	pub fn due_at(now: Timestamp, lookahead: Duration) -> Self {
		Self { after: now.sub_duration(lookahead), until: now }
	}

	pub fn contains(&self, ts: Timestamp) -> bool {
		self.after < ts && ts <= self.until
	}
}

// Reminder tasks //
//****************//
#[derive(Clone, Debug)]
pub struct ReminderTask {
	pub task_id: TaskId,
	pub event: Arc<Event>,
	pub offset_secs: i64,
	pub fire_at: Timestamp,
}

impl ReminderTask {
	pub fn new(event: Arc<Event>, offset_secs: i64) -> Self {
		Self {
			task_id: TaskId::for_reminder(&event.event_id, offset_secs),
			fire_at: event.fire_at(offset_secs),
			event,
			offset_secs,
		}
	}
}

// Delivery ledger //
//*****************//
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
	Pending,
	Claimed,
	Sent,
	Failed,
}

impl DeliveryStatus {
	pub fn as_char(self) -> char {
		match self {
			DeliveryStatus::Pending => 'P',
			DeliveryStatus::Claimed => 'C',
			DeliveryStatus::Sent => 'S',
			DeliveryStatus::Failed => 'F',
		}
	}

	pub fn from_char(c: char) -> Option<Self> {
		match c {
			'P' => Some(DeliveryStatus::Pending),
			'C' => Some(DeliveryStatus::Claimed),
			'S' => Some(DeliveryStatus::Sent),
			'F' => Some(DeliveryStatus::Failed),
			_ => None,
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, DeliveryStatus::Sent | DeliveryStatus::Failed)
	}
}

/// Persisted state of one reminder task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
	pub task_id: TaskId,
	pub event_id: EventId,
	pub fire_at: Timestamp,
	pub status: DeliveryStatus,
	pub holder: Option<HolderId>,
	pub claim_expires_at: Option<Timestamp>,
	pub attempts: u32,
	pub last_error: Option<Box<str>>,
	pub updated_at: Timestamp,
}

impl DeliveryRecord {
	/// Status as observed at `now`: an expired claim counts as pending
	pub fn effective_status(&self, now: Timestamp) -> DeliveryStatus {
		match (self.status, self.claim_expires_at) {
			(DeliveryStatus::Claimed, Some(expires)) if expires <= now => DeliveryStatus::Pending,
			(status, _) => status,
		}
	}

	/// True if a claim by anyone at `now` would be granted
	pub fn is_claimable(&self, now: Timestamp) -> bool {
		self.effective_status(now) == DeliveryStatus::Pending
	}

	/// True if `holder` may still commit or release at `now`
	pub fn is_held_by(&self, holder: &HolderId, now: Timestamp) -> bool {
		self.status == DeliveryStatus::Claimed
			&& self.holder.as_ref() == Some(holder)
			&& self.claim_expires_at.is_some_and(|expires| expires > now)
	}
}

/// Final result of a task, passed to the ledger commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
	Sent,
	Failed,
}

impl From<TaskOutcome> for DeliveryStatus {
	fn from(outcome: TaskOutcome) -> Self {
		match outcome {
			TaskOutcome::Sent => DeliveryStatus::Sent,
			TaskOutcome::Failed => DeliveryStatus::Failed,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitResult {
	Committed,
	/// The claim was reassigned or expired; the result was discarded
	Stale,
}

// Device tokens //
//***************//
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
	#[serde(rename = "web")]
	WebPush,
	#[serde(rename = "fcm")]
	Fcm,
}

impl Platform {
	pub fn as_str(self) -> &'static str {
		match self {
			Platform::WebPush => "web",
			Platform::Fcm => "fcm",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"web" => Some(Platform::WebPush),
			"fcm" => Some(Platform::Fcm),
			_ => None,
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceToken {
	pub user_id: UserId,
	pub platform: Platform,
	pub token: Box<str>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event(reminders: Vec<i64>) -> Event {
		Event {
			event_id: "ev1".into(),
			owner_id: "alice".into(),
			title: "Standup".into(),
			start_at: Timestamp(10_000),
			timezone: "Europe/Budapest".into(),
			reminders,
			invitees: vec!["bob".into(), "alice".into(), "carol".into()],
		}
	}

	#[test]
	fn test_task_id_is_deterministic() {
		let ev = EventId::from("ev1");
		assert_eq!(TaskId::for_reminder(&ev, 1800), TaskId::for_reminder(&ev, 1800));
		assert_ne!(TaskId::for_reminder(&ev, 1800), TaskId::for_reminder(&ev, 900));
		assert_ne!(
			TaskId::for_reminder(&ev, 1800),
			TaskId::for_reminder(&EventId::from("ev2"), 1800)
		);
		assert!(TaskId::for_reminder(&ev, 60).as_str().starts_with("r1~"));
	}

	#[test]
	fn test_task_id_survives_start_change() {
		let mut ev = event(vec![1800]);
		let before = ReminderTask::new(Arc::new(ev.clone()), 1800);
		ev.start_at = Timestamp(20_000);
		let after = ReminderTask::new(Arc::new(ev), 1800);
		assert_eq!(before.task_id, after.task_id);
		assert_ne!(before.fire_at, after.fire_at);
	}

	#[test]
	fn test_audience_dedup() {
		let audience = event(vec![]).audience();
		let names: Vec<&str> = audience.iter().map(UserId::as_str).collect();
		assert_eq!(names, vec!["alice", "bob", "carol"]);
	}

	#[test]
	fn test_fire_window_bounds() {
		let window = FireWindow::due_at(Timestamp(1000), Duration::from_secs(300));
		assert!(!window.contains(Timestamp(700)));
		assert!(window.contains(Timestamp(701)));
		assert!(window.contains(Timestamp(1000)));
		assert!(!window.contains(Timestamp(1001)));
	}

	#[test]
	fn test_effective_status_expires_claim() {
		let record = DeliveryRecord {
			task_id: "t".into(),
			event_id: "e".into(),
			fire_at: Timestamp(0),
			status: DeliveryStatus::Claimed,
			holder: Some("h1".into()),
			claim_expires_at: Some(Timestamp(100)),
			attempts: 1,
			last_error: None,
			updated_at: Timestamp(0),
		};
		assert_eq!(record.effective_status(Timestamp(99)), DeliveryStatus::Claimed);
		assert_eq!(record.effective_status(Timestamp(100)), DeliveryStatus::Pending);
		assert!(record.is_held_by(&"h1".into(), Timestamp(99)));
		assert!(!record.is_held_by(&"h1".into(), Timestamp(100)));
		assert!(!record.is_held_by(&"h2".into(), Timestamp(50)));
	}

	#[test]
	fn test_manual_clock() {
		let clock = ManualClock::new(Timestamp(5));
		clock.advance(10);
		assert_eq!(clock.now(), Timestamp(15));
		clock.set(Timestamp(1));
		assert_eq!(clock.now(), Timestamp(1));
	}
}

// vim: ts=4
