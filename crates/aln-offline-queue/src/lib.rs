//! Two independent FIFO queues bridging offline scanners back to the core
//! (§4.8): content-scan logs from players/esp32s, and scoring transactions
//! from GMs. Both are bounded, persisted after every mutation, and drained
//! single-flight on reconnect.

pub mod error;

pub use error::{OfflineQueueError, Result};

use aln_event_bus::EventBus;
use aln_persistence::{keys, Persistence};
use aln_transactions::TransactionService;
use aln_types::offline_queue::OfflineQueueItem;
use aln_types::{DeviceType, DomainEvent, ScanRequest, Session, TransactionMode, TransactionStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainItemStatus {
	Processed,
	Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainResultItem {
	pub transaction_id: String,
	pub status: DrainItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
	pub batch_id: String,
	pub processed_count: usize,
	pub total_count: usize,
	pub failed_count: usize,
	pub results: Vec<DrainResultItem>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PersistedQueues {
	#[serde(default)]
	player_scans: Vec<OfflineQueueItem>,
	#[serde(default)]
	gm_transactions: Vec<OfflineQueueItem>,
}

struct State {
	player_scan_queue: VecDeque<OfflineQueueItem>,
	gm_transaction_queue: VecDeque<OfflineQueueItem>,
	batch_cache: HashMap<String, (Vec<ScanRequest>, BatchResponse)>,
}

pub struct OfflineQueueService {
	bus: EventBus,
	max_queue_size: usize,
	state: Mutex<State>,
	is_offline: AtomicBool,
	processing: AtomicBool,
}

impl OfflineQueueService {
	#[must_use]
	pub fn new(bus: EventBus) -> Self {
		Self::with_max_size(bus, DEFAULT_MAX_QUEUE_SIZE)
	}

	#[must_use]
	pub fn with_max_size(bus: EventBus, max_queue_size: usize) -> Self {
		Self {
			bus,
			max_queue_size,
			state: Mutex::new(State { player_scan_queue: VecDeque::new(), gm_transaction_queue: VecDeque::new(), batch_cache: HashMap::new() }),
			is_offline: AtomicBool::new(false),
			processing: AtomicBool::new(false),
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	#[must_use]
	pub fn is_offline(&self) -> bool {
		self.is_offline.load(Ordering::SeqCst)
	}

	/// `setOfflineStatus(offline)`: only acts on an actual state change;
	/// `true -> false` returns `true` so the caller knows to schedule a
	/// (non-blocking) drain on the next tick.
	pub fn set_offline_status(&self, offline: bool) -> bool {
		let previous = self.is_offline.swap(offline, Ordering::SeqCst);
		previous && !offline
	}

	/// Enqueue a player/esp32 content-scan log. Returns `None` (and logs) if
	/// the queue is at `maxQueueSize`.
	pub fn enqueue_player_scan(&self, token_id: String, device_id: String) -> Option<OfflineQueueItem> {
		let mut state = self.lock();
		if state.player_scan_queue.len() >= self.max_queue_size {
			tracing::warn!(max = self.max_queue_size, "player scan queue full, rejecting enqueue");
			return None;
		}
		let item = OfflineQueueItem::PlayerScan { queue_id: format!("scan_{}", Uuid::new_v4()), transaction_id: Uuid::new_v4().to_string(), queued_at: Utc::now(), retry_count: 0, token_id, device_id };
		state.player_scan_queue.push_back(item.clone());
		Some(item)
	}

	/// Enqueue a GM scoring transaction.
	#[allow(clippy::too_many_arguments)]
	pub fn enqueue_gm_transaction(&self, token_id: String, team_id: String, device_id: String, device_type: DeviceType, mode: TransactionMode) -> Option<OfflineQueueItem> {
		let mut state = self.lock();
		if state.gm_transaction_queue.len() >= self.max_queue_size {
			tracing::warn!(max = self.max_queue_size, "gm transaction queue full, rejecting enqueue");
			return None;
		}
		let item =
			OfflineQueueItem::GmTransaction { queue_id: format!("gm_{}", Uuid::new_v4()), transaction_id: Uuid::new_v4().to_string(), queued_at: Utc::now(), retry_count: 0, token_id, team_id, device_id, device_type, mode };
		state.gm_transaction_queue.push_back(item.clone());
		Some(item)
	}

	#[must_use]
	pub fn player_scan_queue_len(&self) -> usize {
		self.lock().player_scan_queue.len()
	}

	#[must_use]
	pub fn gm_transaction_queue_len(&self) -> usize {
		self.lock().gm_transaction_queue.len()
	}

	/// `processQueue()` (§4.8): single-flight, player scans first (always
	/// processed as content logs), then GM transactions only if a session
	/// is available. Failures are re-queued at the *head* so per-device
	/// submission order survives the retry (§9).
	pub async fn process_queue(&self, persistence: &dyn Persistence, transactions: &TransactionService, session: Option<&mut Session>) -> Result<()> {
		if self.processing.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		let result = self.drain(transactions, session).await;
		self.processing.store(false, Ordering::SeqCst);
		let (processed, failed, queue_size) = result;

		self.persist(persistence).await?;
		self.bus.publish(DomainEvent::OfflineQueueProcessed { queue_size, processed, failed });
		Ok(())
	}

	async fn drain(&self, transactions: &TransactionService, mut session: Option<&mut Session>) -> (usize, usize, usize) {
		let mut processed = 0usize;
		let mut failed = 0usize;

		let player_items: Vec<OfflineQueueItem> = {
			let mut state = self.lock();
			std::mem::take(&mut state.player_scan_queue).into_iter().collect()
		};
		for item in player_items {
			if let OfflineQueueItem::PlayerScan { token_id, device_id, .. } = &item {
				self.bus.publish(DomainEvent::ScanLogged { token_id: token_id.clone(), device_id: device_id.clone() });
				processed += 1;
			}
		}

		if let Some(session) = session.as_deref_mut() {
			let gm_items: Vec<OfflineQueueItem> = {
				let mut state = self.lock();
				std::mem::take(&mut state.gm_transaction_queue).into_iter().collect()
			};
			// Failures are re-queued at the head, but must keep their relative
			// submission order (§9) — collect them here and splice the whole
			// run back in front, rather than push_front one at a time (which
			// would reverse them).
			let mut retry: VecDeque<OfflineQueueItem> = VecDeque::new();
			for mut item in gm_items {
				if let OfflineQueueItem::GmTransaction { transaction_id, token_id, team_id, device_id, device_type, mode, .. } = &item {
					let request = ScanRequest { transaction_id: Some(transaction_id.clone()), token_id: token_id.clone(), team_id: team_id.clone(), device_id: device_id.clone(), device_type: *device_type, mode: *mode };
					match transactions.process_scan(request, session, false, None) {
						Ok(resp) if resp.status != TransactionStatus::Rejected => {
							processed += 1;
						}
						_ => {
							item.increment_retry();
							retry.push_back(item);
							failed += 1;
						}
					}
				}
			}
			if !retry.is_empty() {
				let mut state = self.lock();
				// Anything enqueued while the drain ran is still in the queue
				// (mem::take only removed what existed at drain start), in
				// FIFO order — the retried run goes ahead of it.
				retry.append(&mut state.gm_transaction_queue);
				state.gm_transaction_queue = retry;
			}
		} else {
			// No session yet: leave the GM queue untouched for the next drain.
		}

		let queue_size = {
			let state = self.lock();
			state.player_scan_queue.len() + state.gm_transaction_queue.len()
		};
		(processed, failed, queue_size)
	}

	/// Idempotent batch endpoint (§4.8, §6 `POST /api/scan/batch`). Repeated
	/// submission with the same `batch_id` and the same payload returns the
	/// cached response and emits no new events (§8 property 7); the same
	/// `batch_id` with a different payload is a conflict (§7).
	pub fn submit_batch(&self, batch_id: &str, requests: Vec<ScanRequest>, transactions: &TransactionService, session: &mut Session) -> Result<BatchResponse> {
		self.submit_batch_checked(batch_id, requests, transactions, session).map(|(response, _)| response)
	}

	/// Same as [`Self::submit_batch`], but also reports whether this call
	/// did the processing or returned a cache hit — the caller needs that to
	/// honor "`batch:ack` exactly once" (§8 property 7) when a cache hit
	/// must not re-emit the unicast acknowledgment.
	pub fn submit_batch_checked(&self, batch_id: &str, requests: Vec<ScanRequest>, transactions: &TransactionService, session: &mut Session) -> Result<(BatchResponse, bool)> {
		if let Some((cached_requests, cached_response)) = self.lock().batch_cache.get(batch_id) {
			return if *cached_requests == requests { Ok((cached_response.clone(), false)) } else { Err(OfflineQueueError::BatchConflict(batch_id.to_string())) };
		}

		let total_count = requests.len();
		let mut results = Vec::with_capacity(total_count);
		let mut processed_count = 0usize;
		let mut failed_count = 0usize;

		for request in &requests {
			let transaction_id = request.transaction_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
			match transactions.process_scan(request.clone(), session, false, None) {
				Ok(resp) if resp.status != TransactionStatus::Rejected => {
					processed_count += 1;
					results.push(DrainResultItem { transaction_id, status: DrainItemStatus::Processed });
				}
				_ => {
					failed_count += 1;
					results.push(DrainResultItem { transaction_id, status: DrainItemStatus::Failed });
				}
			}
		}

		let response = BatchResponse { batch_id: batch_id.to_string(), processed_count, total_count, failed_count, results };
		self.lock().batch_cache.insert(batch_id.to_string(), (requests, response.clone()));
		Ok((response, true))
	}

	/// Persist both queues under the `offlineQueue` key (§6).
	pub async fn persist(&self, persistence: &dyn Persistence) -> Result<()> {
		let (player_scans, gm_transactions) = {
			let state = self.lock();
			(state.player_scan_queue.iter().cloned().collect(), state.gm_transaction_queue.iter().cloned().collect())
		};
		persistence.save_json(keys::OFFLINE_QUEUE, &PersistedQueues { player_scans, gm_transactions }).await?;
		Ok(())
	}

	/// Restore both queues from persistence, migrating the legacy plain-array
	/// shape (§9 "legacy array payloads are accepted and migrated into
	/// `playerScans`").
	pub async fn restore(&self, persistence: &dyn Persistence) -> Result<()> {
		let Some(raw) = persistence.load(keys::OFFLINE_QUEUE).await? else { return Ok(()) };

		let persisted = serde_json::from_slice::<PersistedQueues>(&raw)
			.or_else(|_| serde_json::from_slice::<Vec<OfflineQueueItem>>(&raw).map(|player_scans| PersistedQueues { player_scans, gm_transactions: Vec::new() }))
			.unwrap_or_default();

		let mut state = self.lock();
		state.player_scan_queue = persisted.player_scans.into_iter().collect();
		state.gm_transaction_queue = persisted.gm_transactions.into_iter().collect();
		Ok(())
	}
}
