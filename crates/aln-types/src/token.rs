use crate::{GroupId, TokenId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAssets {
	pub video: Option<String>,
	pub audio: Option<String>,
	pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
	pub id: TokenId,
	pub value: u64,
	pub memory_type: String,
	pub value_rating: u32,
	pub group_id: Option<GroupId>,
	pub group_multiplier: u32,
	pub media_assets: MediaAssets,
	pub duration_secs: Option<u32>,
}

impl Token {
	#[must_use]
	pub fn has_video(&self) -> bool {
		self.media_assets.video.is_some()
	}
}
