//! Read-only token catalog (§4.4). Loading the catalog off disk is a §1
//! non-goal; this crate only owns the in-memory lookup structure the core
//! consumes once a caller has produced a `Vec<Token>` from wherever the venue
//! stores its content.

use aln_types::{GroupId, Token, TokenId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("duplicate token id in catalog: {0}")]
	DuplicateTokenId(TokenId),
	#[error("group {group} has inconsistent multiplier: token {token} carries {found}, group is {expected}")]
	InconsistentGroupMultiplier { group: GroupId, token: TokenId, found: u32, expected: u32 },
}

/// O(1) lookup by id, grouped index built once at construction so
/// `tokens_in_group` and `group_multiplier` never rescan the full catalog.
#[derive(Debug, Clone)]
pub struct TokenCatalog {
	tokens: HashMap<TokenId, Token>,
	groups: HashMap<GroupId, HashSet<TokenId>>,
}

impl TokenCatalog {
	/// # Errors
	/// Returns [`CatalogError`] if two tokens share an id, or if tokens in
	/// the same group disagree about the group's multiplier — §3 states "all
	/// members share it", so a catalog violating that is malformed input,
	/// not a runtime condition the core should paper over.
	pub fn new(tokens: Vec<Token>) -> Result<Self, CatalogError> {
		let mut by_id = HashMap::with_capacity(tokens.len());
		let mut groups: HashMap<GroupId, HashSet<TokenId>> = HashMap::new();
		let mut group_multipliers: HashMap<GroupId, u32> = HashMap::new();

		for token in tokens {
			if by_id.contains_key(&token.id) {
				return Err(CatalogError::DuplicateTokenId(token.id));
			}
			if let Some(group_id) = token.group_id.clone() {
				match group_multipliers.get(&group_id) {
					Some(expected) if *expected != token.group_multiplier => {
						return Err(CatalogError::InconsistentGroupMultiplier { group: group_id, token: token.id, found: token.group_multiplier, expected: *expected });
					}
					_ => {
						group_multipliers.insert(group_id.clone(), token.group_multiplier);
					}
				}
				groups.entry(group_id).or_default().insert(token.id.clone());
			}
			by_id.insert(token.id.clone(), token);
		}

		Ok(Self { tokens: by_id, groups })
	}

	#[must_use]
	pub fn get(&self, token_id: &str) -> Option<&Token> {
		self.tokens.get(token_id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// The multiplier carried by any token in the group — all members share
	/// it, enforced at construction time.
	#[must_use]
	pub fn group_multiplier(&self, group_id: &str) -> Option<u32> {
		self.groups.get(group_id).and_then(|ids| ids.iter().next()).and_then(|id| self.tokens.get(id)).map(|t| t.group_multiplier)
	}

	#[must_use]
	pub fn tokens_in_group(&self, group_id: &str) -> HashSet<TokenId> {
		self.groups.get(group_id).cloned().unwrap_or_default()
	}
}
