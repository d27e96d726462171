//! In-memory adapters
//!
//! Used by the test suites of the engine crates. The ledger
//! serialises every operation through one mutex, which makes claim, commit
//! and release linearizable per task within a process.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::{
	collections::{BTreeMap, HashMap, VecDeque},
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use crate::prelude::*;
use chime_types::event_adapter::EventAdapter;
use chime_types::ledger_adapter::LedgerAdapter;
use chime_types::push_gateway::{NotificationPayload, PushGateway, PushOutcome};
use chime_types::token_adapter::TokenAdapter;
use chime_types::types::{
	CommitResult, DeliveryRecord, DeliveryStatus, DeviceToken, Event, EventReminder, FireWindow,
	Platform, ReminderTask, TaskOutcome,
};

// MemoryEventStore
//******************
#[derive(Debug, Default)]
pub struct MemoryEventStore {
	events: RwLock<BTreeMap<EventId, Arc<Event>>>,
	unavailable: AtomicBool,
}

impl MemoryEventStore {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn upsert(&self, event: Event) {
		self.events.write().insert(event.event_id.clone(), Arc::new(event));
	}

	pub fn remove(&self, event_id: &EventId) {
		self.events.write().remove(event_id);
	}

	/// Makes every query fail, simulating an unreachable store
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	fn check_available(&self) -> ChResult<()> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::ServiceUnavailable("event store unavailable".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl EventAdapter for MemoryEventStore {
	async fn query_by_fire_window(&self, window: FireWindow) -> ChResult<Vec<EventReminder>> {
		self.check_available()?;
		let events = self.events.read();
		let mut res = Vec::new();
		for event in events.values() {
			for &offset_secs in &event.reminders {
				if window.contains(event.fire_at(offset_secs)) {
					res.push(EventReminder { event: event.clone(), offset_secs });
				}
			}
		}
		Ok(res)
	}

	async fn read_event(&self, event_id: &EventId) -> ChResult<Event> {
		self.check_available()?;
		self.events.read().get(event_id).map(|ev| Event::clone(ev)).ok_or(Error::NotFound)
	}
}

// MemoryTokenRegistry
//*********************
#[derive(Debug, Default)]
pub struct MemoryTokenRegistry {
	tokens: RwLock<Vec<(DeviceToken, bool)>>,
}

impl MemoryTokenRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Registers a token; registering an invalidated token revives it
	pub fn register(&self, token: DeviceToken) {
		let mut tokens = self.tokens.write();
		if let Some(entry) = tokens.iter_mut().find(|(t, _)| *t == token) {
			entry.1 = true;
		} else {
			tokens.push((token, true));
		}
	}

	pub fn is_valid(&self, token: &DeviceToken) -> bool {
		self.tokens.read().iter().any(|(t, valid)| t == token && *valid)
	}
}

#[async_trait]
impl TokenAdapter for MemoryTokenRegistry {
	async fn tokens_for(&self, user_id: &UserId) -> ChResult<Vec<DeviceToken>> {
		Ok(self
			.tokens
			.read()
			.iter()
			.filter(|(t, valid)| *valid && &t.user_id == user_id)
			.map(|(t, _)| t.clone())
			.collect())
	}

	async fn invalidate(&self, token: &DeviceToken) -> ChResult<()> {
		for entry in self.tokens.write().iter_mut().filter(|(t, _)| t == token) {
			entry.1 = false;
		}
		Ok(())
	}
}

// MemoryLedger
//**************
#[derive(Debug, Default)]
pub struct MemoryLedger {
	records: Mutex<HashMap<TaskId, DeliveryRecord>>,
	commits: Mutex<Vec<(TaskId, HolderId, TaskOutcome)>>,
}

impl MemoryLedger {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn record(&self, task_id: &TaskId) -> Option<DeliveryRecord> {
		self.records.lock().get(task_id).cloned()
	}

	/// Every commit that was applied, in order
	pub fn commits(&self) -> Vec<(TaskId, HolderId, TaskOutcome)> {
		self.commits.lock().clone()
	}
}

#[async_trait]
impl LedgerAdapter for MemoryLedger {
	async fn claim(
		&self,
		task: &ReminderTask,
		holder: &HolderId,
		lease: Duration,
		now: Timestamp,
	) -> ChResult<bool> {
		let mut records = self.records.lock();
		let record = records.entry(task.task_id.clone()).or_insert_with(|| DeliveryRecord {
			task_id: task.task_id.clone(),
			event_id: task.event.event_id.clone(),
			fire_at: task.fire_at,
			status: DeliveryStatus::Pending,
			holder: None,
			claim_expires_at: None,
			attempts: 0,
			last_error: None,
			updated_at: now,
		});
		if !record.is_claimable(now) {
			return Ok(false);
		}
		record.status = DeliveryStatus::Claimed;
		record.holder = Some(holder.clone());
		record.claim_expires_at = Some(now.add_duration(lease));
		record.attempts += 1;
		record.fire_at = task.fire_at;
		record.updated_at = now;
		Ok(true)
	}

	async fn commit(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		outcome: TaskOutcome,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<CommitResult> {
		let mut records = self.records.lock();
		let Some(record) = records.get_mut(task_id).filter(|r| r.is_held_by(holder, now)) else {
			return Ok(CommitResult::Stale);
		};
		record.status = outcome.into();
		record.last_error = last_error.map(Into::into);
		record.updated_at = now;
		self.commits.lock().push((task_id.clone(), holder.clone(), outcome));
		Ok(CommitResult::Committed)
	}

	async fn release(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		retry_at: Timestamp,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<bool> {
		let mut records = self.records.lock();
		let Some(record) = records.get_mut(task_id).filter(|r| r.is_held_by(holder, now)) else {
			return Ok(false);
		};
		record.claim_expires_at = record.claim_expires_at.map(|expires| expires.min(retry_at));
		record.last_error = last_error.map(Into::into);
		record.updated_at = now;
		Ok(true)
	}

	async fn read(&self, task_ids: &[TaskId]) -> ChResult<Vec<DeliveryRecord>> {
		let records = self.records.lock();
		Ok(task_ids.iter().filter_map(|id| records.get(id).cloned()).collect())
	}
}

// MemoryGateway
//***************
/// Gateway that records deliveries instead of sending them.
///
/// Outcomes can be scripted per token; unscripted sends succeed.
#[derive(Debug)]
pub struct MemoryGateway {
	platform: Platform,
	script: Mutex<HashMap<Box<str>, VecDeque<PushOutcome>>>,
	failing_batches: Mutex<u32>,
	delay: Mutex<Option<Duration>>,
	delivered: Mutex<Vec<(DeviceToken, NotificationPayload)>>,
	calls: Mutex<u32>,
}

impl MemoryGateway {
	pub fn new(platform: Platform) -> Arc<Self> {
		Arc::new(Self {
			platform,
			script: Mutex::new(HashMap::new()),
			failing_batches: Mutex::new(0),
			delay: Mutex::new(None),
			delivered: Mutex::new(Vec::new()),
			calls: Mutex::new(0),
		})
	}

	/// Queues outcomes for the next sends to `token`
	pub fn script(&self, token: &str, outcomes: impl IntoIterator<Item = PushOutcome>) {
		self.script.lock().entry(token.into()).or_default().extend(outcomes);
	}

	/// Fails the next `count` batch calls as a whole
	pub fn fail_batches(&self, count: u32) {
		*self.failing_batches.lock() = count;
	}

	/// Delays every batch call, e.g. to exercise timeouts
	pub fn set_delay(&self, delay: Option<Duration>) {
		*self.delay.lock() = delay;
	}

	pub fn delivered(&self) -> Vec<(DeviceToken, NotificationPayload)> {
		self.delivered.lock().clone()
	}

	/// Number of batch calls received
	pub fn calls(&self) -> u32 {
		*self.calls.lock()
	}
}

#[async_trait]
impl PushGateway for MemoryGateway {
	fn platform(&self) -> Platform {
		self.platform
	}

	async fn send(
		&self,
		tokens: &[DeviceToken],
		payload: &NotificationPayload,
	) -> ChResult<Vec<PushOutcome>> {
		*self.calls.lock() += 1;
		let delay = *self.delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		{
			let mut failing = self.failing_batches.lock();
			if *failing > 0 {
				*failing -= 1;
				return Err(Error::ServiceUnavailable("gateway unavailable".into()));
			}
		}

		let mut script = self.script.lock();
		let mut delivered = self.delivered.lock();
		Ok(tokens
			.iter()
			.map(|token| {
				let outcome = script
					.get_mut(&token.token)
					.and_then(VecDeque::pop_front)
					.unwrap_or(PushOutcome::Success);
				if outcome == PushOutcome::Success {
					debug!(platform = %self.platform, user_id = %token.user_id, title = %payload.title, "Recorded push delivery");
					delivered.push((token.clone(), payload.clone()));
				}
				outcome
			})
			.collect())
	}
}


// vim: ts=4
