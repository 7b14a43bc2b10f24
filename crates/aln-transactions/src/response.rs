use aln_types::{Token, Transaction, TransactionStatus};
use serde::Serialize;

/// Step 10 of `processScan` (§4.6): the synchronous reply to whichever
/// transport adapter submitted the scan, independent of whatever domain
/// events were also emitted as a side effect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
	pub status: TransactionStatus,
	pub message: String,
	pub transaction_id: String,
	pub transaction: Transaction,
	pub token: Option<Token>,
	pub points: Option<i64>,
	pub original_transaction_id: Option<String>,
	pub claimed_by: Option<String>,
	pub video_playing: bool,
	pub wait_time: Option<u32>,
}
