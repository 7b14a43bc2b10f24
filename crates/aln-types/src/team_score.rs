use crate::{GroupId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAdjustment {
	pub delta: i64,
	pub gm: String,
	pub reason: String,
	pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
	pub team_id: TeamId,
	pub base_score: i64,
	pub bonus_points: i64,
	pub current_score: i64,
	pub tokens_scanned: u64,
	pub completed_groups: BTreeSet<GroupId>,
	pub admin_adjustments: Vec<AdminAdjustment>,
	pub last_update: DateTime<Utc>,
	pub last_token_time: Option<DateTime<Utc>>,
}

impl TeamScore {
	#[must_use]
	pub fn new(team_id: TeamId) -> Self {
		Self {
			team_id,
			base_score: 0,
			bonus_points: 0,
			current_score: 0,
			tokens_scanned: 0,
			completed_groups: BTreeSet::new(),
			admin_adjustments: Vec::new(),
			last_update: Utc::now(),
			last_token_time: None,
		}
	}

	/// `currentScore = baseScore + bonusPoints + sum(adminAdjustments.delta)` — the
	/// single formula every mutation below recomputes from, never a drifting cache.
	pub fn recompute_current_score(&mut self) {
		let adjustments: i64 = self.admin_adjustments.iter().map(|a| a.delta).sum();
		self.current_score = self.base_score + self.bonus_points + adjustments;
		self.last_update = Utc::now();
	}

	pub fn add_token_points(&mut self, points: i64) {
		self.base_score += points;
		self.tokens_scanned += 1;
		self.last_token_time = Some(Utc::now());
		self.recompute_current_score();
	}

	pub fn add_group_bonus(&mut self, group_id: GroupId, bonus: i64) -> bool {
		if self.completed_groups.insert(group_id) {
			self.bonus_points += bonus;
			self.recompute_current_score();
			true
		} else {
			false
		}
	}

	pub fn apply_admin_adjustment(&mut self, delta: i64, gm: String, reason: String) {
		self.admin_adjustments.push(AdminAdjustment { delta, gm, reason, at: Utc::now() });
		self.recompute_current_score();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_score_identity_holds() {
		let mut score = TeamScore::new("Team Alpha".into());
		score.add_token_points(5000);
		score.apply_admin_adjustment(-100, "gm1".into(), "penalty".into());
		let expected = score.base_score + score.bonus_points + score.admin_adjustments.iter().map(|a| a.delta).sum::<i64>();
		assert_eq!(score.current_score, expected);
	}

	#[test]
	fn group_completion_is_one_shot() {
		let mut score = TeamScore::new("Team Alpha".into());
		assert!(score.add_group_bonus("G".into(), 12000));
		assert!(!score.add_group_bonus("G".into(), 12000));
		assert_eq!(score.bonus_points, 12000);
	}
}
