use crate::error::{Result, TransactionError};
use crate::response::ScanResponse;
use aln_catalog::TokenCatalog;
use aln_event_bus::EventBus;
use aln_types::event::{DeviceTracking, GroupBonus};
use aln_types::session::SessionStatus;
use aln_types::{DomainEvent, ScanRequest, Session, TeamScore, Transaction, TransactionMode, TransactionStatus};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// Default cap on `recentTransactions` (§3, §8 boundary behavior: "trimmed to
/// configured limit, newest first").
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// The adjudicator (§4.6). Holds the read-only catalog snapshot and the
/// bounded `recentTransactions` ring; everything else it needs — team
/// scores, claim state, the transaction log — lives on the `Session` the
/// caller passes in. This crate never imports `aln-session`: per §9's
/// re-architecture note, transaction service reads the session only through
/// the `Session` value itself, and the session service is the only caller
/// that owns the lock making steps 4-6 atomic (§5).
pub struct TransactionService {
	catalog: TokenCatalog,
	bus: EventBus,
	recent_limit: usize,
	recent: Mutex<VecDeque<Transaction>>,
}

impl TransactionService {
	#[must_use]
	pub fn new(catalog: TokenCatalog, bus: EventBus) -> Self {
		Self::with_recent_limit(catalog, bus, DEFAULT_RECENT_LIMIT)
	}

	#[must_use]
	pub fn with_recent_limit(catalog: TokenCatalog, bus: EventBus, recent_limit: usize) -> Self {
		Self { catalog, bus, recent_limit, recent: Mutex::new(VecDeque::new()) }
	}

	#[must_use]
	pub fn recent_transactions(&self) -> Vec<Transaction> {
		self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter().cloned().collect()
	}

	/// `processScan` (§4.6 steps 1-10). Caller must hold exclusive access to
	/// `session` for the full duration of this call — concurrently invoking
	/// it twice against the same session is exactly the race §5's
	/// "Adjudication atomicity" rule forbids.
	pub fn process_scan(&self, request: ScanRequest, session: &mut Session, video_playing: bool, video_wait_time: Option<u32>) -> Result<ScanResponse> {
		if session.status != SessionStatus::Active && session.status != SessionStatus::Paused {
			return Err(TransactionError::NoActiveSession);
		}

		let transaction_id = request.transaction_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

		let mut transaction = Transaction {
			id: transaction_id.clone(),
			session_id: session.id.clone(),
			token_id: request.token_id.clone(),
			team_id: request.team_id.clone(),
			device_id: request.device_id.clone(),
			device_type: request.device_type,
			mode: request.mode,
			points: 0,
			status: TransactionStatus::Rejected,
			rejection_reason: None,
			original_transaction_id: None,
			timestamp: Utc::now(),
		};

		// Step 3: token lookup.
		let Some(token) = self.catalog.get(&request.token_id).cloned() else {
			transaction.rejection_reason = Some("Invalid token ID".to_string());
			return Ok(ScanResponse {
				status: TransactionStatus::Rejected,
				message: "Invalid token ID".to_string(),
				transaction_id,
				transaction,
				token: None,
				points: None,
				original_transaction_id: None,
				claimed_by: None,
				video_playing,
				wait_time: video_wait_time,
			});
		};

		// Step 4: duplicate adjudication by device type.
		if request.device_type.claims_tokens() {
			// 4a: per-device check.
			if session.device_has_scanned(&request.device_id, &request.token_id) {
				if let Some(original) = Self::find_accepted_for_token(session, &request.token_id) {
					transaction.status = TransactionStatus::Duplicate;
					transaction.original_transaction_id = Some(original.id.clone());
					let claimed_by = original.team_id.clone();
					let original_id = original.id.clone();
					self.bus.publish(DomainEvent::TransactionDuplicate { transaction: transaction.clone(), claimed_by: claimed_by.clone(), original_transaction_id: original_id.clone() });
					return Ok(ScanResponse {
						status: TransactionStatus::Duplicate,
						message: "Token already scanned by this device".to_string(),
						transaction_id,
						transaction,
						token: Some(token),
						points: Some(0),
						original_transaction_id: Some(original_id),
						claimed_by: Some(claimed_by),
						video_playing,
						wait_time: video_wait_time,
					});
				}
			}

			// 4b: first-come-first-served.
			if let Some(original) = Self::find_accepted_for_token(session, &request.token_id) {
				transaction.status = TransactionStatus::Duplicate;
				transaction.original_transaction_id = Some(original.id.clone());
				let claimed_by = original.team_id.clone();
				let original_id = original.id.clone();
				self.bus.publish(DomainEvent::TransactionDuplicate { transaction: transaction.clone(), claimed_by: claimed_by.clone(), original_transaction_id: original_id.clone() });
				return Ok(ScanResponse {
					status: TransactionStatus::Duplicate,
					message: "Token already claimed".to_string(),
					transaction_id,
					transaction,
					token: Some(token),
					points: Some(0),
					original_transaction_id: Some(original_id),
					claimed_by: Some(claimed_by),
					video_playing,
					wait_time: video_wait_time,
				});
			}
		}

		// Step 5: atomic claim. Append *before* marking accepted so a
		// concurrent scan against the same session observes this claim in
		// its own step-4 check (§9 "race window" fix).
		let points = if transaction.mode == TransactionMode::Detective { 0 } else { i64_from_token_value(token.value) };
		transaction.points = points;
		transaction.status = TransactionStatus::Accepted;
		session.transactions.push(transaction.clone());

		// Step 6: record device-token scan.
		session.record_device_token_scan(&request.device_id, &request.token_id);

		// Step 7: score update + group completion, skipped for detective mode.
		let mut group_bonus = None;
		let team_score = if transaction.mode == TransactionMode::Detective {
			session.team_score(&request.team_id).cloned().ok_or_else(|| TransactionError::UnknownTeam(request.team_id.clone()))?
		} else {
			let updated = self.update_team_score(session, &request.team_id, &token)?;
			if let Some(group_id) = token.group_id.clone() {
				group_bonus = self.check_group_completion(session, &request.team_id, &token.id, &group_id)?;
			}
			session.team_score(&request.team_id).cloned().unwrap_or(updated)
		};

		// Step 8: recent-transactions ring, newest first, trimmed to limit.
		{
			let mut recent = self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
			recent.push_front(transaction.clone());
			recent.truncate(self.recent_limit);
		}

		// Step 9: emit events in the order SPEC_FULL §5 fixes as observable:
		// transaction:accepted -> (optional) group:completed -> score:updated.
		let device_tracking = DeviceTracking { device_id: request.device_id.clone(), token_id: request.token_id.clone() };
		self.bus.publish(DomainEvent::TransactionAccepted { transaction: transaction.clone(), team_score: team_score.clone(), device_tracking, group_bonus: group_bonus.clone() });
		if let Some(bonus) = &group_bonus {
			self.bus.publish(DomainEvent::GroupCompleted(bonus.clone()));
		}
		if transaction.mode != TransactionMode::Detective {
			self.bus.publish(DomainEvent::ScoreUpdated(team_score.clone()));
		}

		Ok(ScanResponse {
			status: TransactionStatus::Accepted,
			message: "Accepted".to_string(),
			transaction_id,
			transaction,
			token: Some(token),
			points: Some(points),
			original_transaction_id: None,
			claimed_by: None,
			video_playing,
			wait_time: video_wait_time,
		})
	}

	fn find_accepted_for_token<'a>(session: &'a Session, token_id: &str) -> Option<&'a Transaction> {
		session.transactions.iter().find(|t| t.token_id == token_id && t.status == TransactionStatus::Accepted)
	}

	fn update_team_score(&self, session: &mut Session, team_id: &str, token: &aln_types::Token) -> Result<TeamScore> {
		let score = session.scores.iter_mut().find(|s| s.team_id == team_id).ok_or_else(|| TransactionError::UnknownTeam(team_id.to_string()))?;
		score.add_token_points(i64_from_token_value(token.value));
		Ok(score.clone())
	}

	/// Group completion (§4.6): the team's claimed-token-ids from *already
	/// accepted* transactions, plus the token just processed. Step 5 already
	/// pushed this transaction before this check runs, so the token is
	/// already a member of the accepted set — the union is a no-op here but
	/// kept explicit since callers that compute the set before appending
	/// would need it.
	fn check_group_completion(&self, session: &mut Session, team_id: &str, current_token_id: &str, group_id: &str) -> Result<Option<GroupBonus>> {
		let members = self.catalog.tokens_in_group(group_id);
		if members.len() < 2 {
			return Ok(None);
		}
		let Some(multiplier) = self.catalog.group_multiplier(group_id) else { return Ok(None) };
		if multiplier <= 1 {
			return Ok(None);
		}

		let mut claimed: HashSet<String> = session.accepted_token_ids_for_team(team_id);
		claimed.insert(current_token_id.to_string());

		if !members.is_subset(&claimed) {
			return Ok(None);
		}

		let sum: u64 = members.iter().filter_map(|id| self.catalog.get(id)).map(|t| t.value).sum();
		let bonus_amount = (i64::from(multiplier) - 1) * i64_from_token_value(sum);

		let score = session.scores.iter_mut().find(|s| s.team_id == team_id).ok_or_else(|| TransactionError::UnknownTeam(team_id.to_string()))?;
		if !score.add_group_bonus(group_id.to_string(), bonus_amount) {
			// Already completed this session (one-shot per team per session).
			return Ok(None);
		}

		Ok(Some(GroupBonus { team_id: team_id.to_string(), group_id: group_id.to_string(), multiplier, bonus: bonus_amount }))
	}

	/// `adjustTeamScore` (§4.6): admin override, always auditable.
	pub fn adjust_team_score(&self, session: &mut Session, team_id: &str, delta: i64, reason: String, gm: String) -> Result<TeamScore> {
		let score = session.scores.iter_mut().find(|s| s.team_id == team_id).ok_or_else(|| TransactionError::UnknownTeam(team_id.to_string()))?;
		score.apply_admin_adjustment(delta, gm, reason.clone());
		let updated = score.clone();
		self.bus.publish(DomainEvent::ScoreAdjusted { team_score: updated.clone(), reason, is_admin_action: true });
		Ok(updated)
	}

	/// `deleteTransaction` (§4.6): remove and rebuild from scratch so the
	/// result never depends on the deletion's position in history (§8
	/// property 5, rebuild determinism).
	pub fn delete_transaction(&self, session: &mut Session, transaction_id: &str) -> Result<()> {
		let position = session.transactions.iter().position(|t| t.id == transaction_id).ok_or_else(|| TransactionError::UnknownTransaction(transaction_id.to_string()))?;
		let removed = session.transactions.remove(position);

		let team_ids: Vec<String> = session.scores.iter().map(|s| s.team_id.clone()).collect();
		let rebuilt = self.rebuild_scores_from_transactions(&session.transactions, &team_ids);
		session.scores = rebuilt;

		let updated_team_score = session.team_score(&removed.team_id).cloned().ok_or_else(|| TransactionError::UnknownTeam(removed.team_id.clone()))?;

		self.bus.publish(DomainEvent::ScoreUpdated(updated_team_score.clone()));
		self.bus.publish(DomainEvent::TransactionDeleted { transaction_id: removed.id, token_id: removed.token_id, team_id: removed.team_id, updated_team_score });
		Ok(())
	}

	/// `rebuildScoresFromTransactions` (§4.6): deterministic, independent of
	/// rebuild history — always walks the fixed accepted-non-detective
	/// subset in insertion order and nothing else.
	#[must_use]
	pub fn rebuild_scores_from_transactions(&self, transactions: &[Transaction], team_ids: &[String]) -> Vec<TeamScore> {
		let mut scores: Vec<TeamScore> = team_ids.iter().cloned().map(TeamScore::new).collect();
		let mut claimed_by_team: std::collections::HashMap<String, HashSet<String>> = std::collections::HashMap::new();

		for tx in transactions {
			if tx.status != TransactionStatus::Accepted || tx.mode == TransactionMode::Detective {
				continue;
			}
			let Some(score) = scores.iter_mut().find(|s| s.team_id == tx.team_id) else { continue };
			let Some(token) = self.catalog.get(&tx.token_id) else { continue };
			score.add_token_points(i64_from_token_value(token.value));
			claimed_by_team.entry(tx.team_id.clone()).or_default().insert(tx.token_id.clone());
		}

		for score in &mut scores {
			let claimed = claimed_by_team.get(&score.team_id).cloned().unwrap_or_default();
			let mut groups_in_claim: HashSet<String> = HashSet::new();
			for token_id in &claimed {
				if let Some(group_id) = self.catalog.get(token_id).and_then(|t| t.group_id.clone()) {
					groups_in_claim.insert(group_id);
				}
			}
			for group_id in groups_in_claim {
				let members = self.catalog.tokens_in_group(&group_id);
				if members.len() < 2 {
					continue;
				}
				let Some(multiplier) = self.catalog.group_multiplier(&group_id) else { continue };
				if multiplier <= 1 || !members.is_subset(&claimed) {
					continue;
				}
				let sum: u64 = members.iter().filter_map(|id| self.catalog.get(id)).map(|t| t.value).sum();
				let bonus = (i64::from(multiplier) - 1) * i64_from_token_value(sum);
				score.add_group_bonus(group_id, bonus);
			}
		}

		scores
	}

	/// `restoreFromSession` (§4.6): rebuild scores from the persisted
	/// transaction log, then make sure every persisted team (including ones
	/// with zero scans) still appears.
	pub fn restore_from_session(&self, session: &mut Session) {
		let team_ids: Vec<String> = session.scores.iter().map(|s| s.team_id.clone()).collect();
		session.scores = self.rebuild_scores_from_transactions(&session.transactions, &team_ids);
		self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
		let mut recent: VecDeque<Transaction> = session.transactions.iter().rev().take(self.recent_limit).cloned().collect();
		recent.make_contiguous();
		*self.recent.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = recent;
	}
}

fn i64_from_token_value(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}
