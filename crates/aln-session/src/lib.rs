//! Session lifecycle and the authoritative `session.scores` owner (§4.3).

pub mod error;
pub mod service;

pub use error::{Result, SessionError};
pub use service::SessionService;

#[cfg(test)]
mod tests {
	use super::*;
	use aln_catalog::TokenCatalog;
	use aln_clock::GameClock;
	use aln_event_bus::EventBus;
	use aln_persistence::MemoryStore;
	use aln_transactions::TransactionService;
	use aln_types::session::SessionStatus;
	use aln_types::{DeviceType, ScanRequest, TransactionMode, TransactionStatus};
	use std::sync::Arc;

	fn build() -> SessionService {
		let bus = EventBus::new(64);
		let persistence: Arc<dyn aln_persistence::Persistence> = Arc::new(MemoryStore::new());
		let clock = Arc::new(GameClock::new(bus.clone(), None));
		let catalog = TokenCatalog::new(vec![]).unwrap();
		let transactions = Arc::new(TransactionService::new(catalog, bus.clone()));
		SessionService::new(persistence, bus, clock, transactions, None)
	}

	#[tokio::test]
	async fn create_session_arms_active_status() {
		let svc = build();
		let session = svc.create_session("Game Night".into(), &["Team Alpha".into()]).await.unwrap();
		assert_eq!(session.status, SessionStatus::Active);
		assert!(session.game_start_time.is_some());
	}

	#[tokio::test]
	async fn creating_a_new_session_ends_the_previous_one() {
		let svc = build();
		let first = svc.create_session("First".into(), &["Team Alpha".into()]).await.unwrap();
		svc.create_session("Second".into(), &["Team Beta".into()]).await.unwrap();

		let current = svc.current_session().await.unwrap();
		assert_ne!(current.id, first.id);
	}

	#[tokio::test]
	async fn illegal_transition_is_rejected() {
		let svc = build();
		svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();
		let err = svc.update_session_status(SessionStatus::Setup).await;
		assert!(err.is_err());
	}

	#[tokio::test]
	async fn pause_resume_round_trips() {
		let svc = build();
		svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();
		svc.update_session_status(SessionStatus::Paused).await.unwrap();
		let session = svc.update_session_status(SessionStatus::Active).await.unwrap();
		assert_eq!(session.status, SessionStatus::Active);
	}

	#[tokio::test]
	async fn duplicate_team_add_is_rejected() {
		let svc = build();
		svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();
		let err = svc.add_team_to_session("Team Alpha".into()).await;
		assert!(err.is_err());
	}

	#[tokio::test]
	async fn process_scan_persists_and_updates_score() {
		let svc = build();
		svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();
		let resp = svc
			.process_scan(ScanRequest { transaction_id: None, token_id: "ghost".into(), team_id: "Team Alpha".into(), device_id: "gm1".into(), device_type: DeviceType::Gm, mode: TransactionMode::Blackmarket }, false, None)
			.await
			.unwrap();
		assert_eq!(resp.status, TransactionStatus::Rejected);
	}

	#[tokio::test]
	async fn end_session_clears_current() {
		let svc = build();
		svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();
		svc.end_session().await.unwrap();
		assert!(svc.current_session().await.is_none());
	}

	#[tokio::test]
	async fn restore_from_persistence_recovers_session() {
		let bus = EventBus::new(64);
		let persistence: Arc<dyn aln_persistence::Persistence> = Arc::new(MemoryStore::new());
		let clock = Arc::new(GameClock::new(bus.clone(), None));
		let catalog = TokenCatalog::new(vec![]).unwrap();
		let transactions = Arc::new(TransactionService::new(catalog, bus.clone()));
		let svc = SessionService::new(Arc::clone(&persistence), bus.clone(), clock, transactions, None);
		let created = svc.create_session("Game".into(), &["Team Alpha".into()]).await.unwrap();

		let clock2 = Arc::new(GameClock::new(bus.clone(), None));
		let catalog2 = TokenCatalog::new(vec![]).unwrap();
		let transactions2 = Arc::new(TransactionService::new(catalog2, bus.clone()));
		let restored_svc = SessionService::new(persistence, bus, clock2, transactions2, None);
		restored_svc.restore_from_persistence().await.unwrap();

		let restored = restored_svc.current_session().await.unwrap();
		assert_eq!(restored.id, created.id);
	}
}
