//! Payload normalization and condition evaluation for standing-event cues
//! (§4.9 "Event path" and "Condition evaluation").

use aln_catalog::TokenCatalog;
use aln_types::{ConditionOp, CueCondition};
use serde_json::{Map, Value};

/// Per-event flattening table. `transaction:accepted` is the one event
/// §4.9 spells out explicitly; everything else passes its object fields
/// through unchanged so a cue can still match on any top-level field of an
/// event the table doesn't special-case.
#[must_use]
pub fn normalize_payload(event_name: &str, raw: &Value, catalog: &TokenCatalog) -> Map<String, Value> {
	if event_name == "transaction:accepted" {
		return normalize_transaction_accepted(raw, catalog);
	}
	match raw {
		Value::Object(map) => map.clone(),
		_ => Map::new(),
	}
}

fn normalize_transaction_accepted(raw: &Value, catalog: &TokenCatalog) -> Map<String, Value> {
	let mut ctx = Map::new();

	if let Some(transaction) = raw.get("transaction") {
		for field in ["tokenId", "teamId", "deviceType", "points"] {
			if let Some(value) = transaction.get(field) {
				ctx.insert(field.to_string(), value.clone());
			}
		}
	}
	if let Some(team_score) = raw.get("team_score") {
		ctx.insert("teamScore".to_string(), team_score.clone());
	}

	let group_bonus = raw.get("group_bonus").filter(|v| !v.is_null());
	ctx.insert("hasGroupBonus".to_string(), Value::Bool(group_bonus.is_some()));
	if let Some(group_id) = group_bonus.and_then(|gb| gb.get("groupId")) {
		ctx.insert("groupId".to_string(), group_id.clone());
	}

	if let Some(token_id) = ctx.get("tokenId").and_then(Value::as_str) {
		if let Some(token) = catalog.get(token_id) {
			ctx.insert("memoryType".to_string(), Value::String(token.memory_type.clone()));
			ctx.insert("valueRating".to_string(), Value::from(token.value_rating));
			if !ctx.contains_key("groupId") {
				if let Some(group_id) = &token.group_id {
					ctx.insert("groupId".to_string(), Value::String(group_id.clone()));
				}
			}
		}
	}

	ctx
}

/// All conditions match (implicit AND); an empty slice always matches.
#[must_use]
pub fn conditions_match(conditions: &[CueCondition], context: &Map<String, Value>) -> bool {
	conditions.iter().all(|condition| evaluate(condition, context))
}

fn evaluate(condition: &CueCondition, context: &Map<String, Value>) -> bool {
	let actual = context.get(&condition.field).cloned().unwrap_or(Value::Null);
	match condition.op {
		ConditionOp::Eq => actual == condition.value,
		ConditionOp::Neq => actual != condition.value,
		ConditionOp::Gt => compare(&actual, &condition.value).is_some_and(|o| o == std::cmp::Ordering::Greater),
		ConditionOp::Gte => compare(&actual, &condition.value).is_some_and(|o| o != std::cmp::Ordering::Less),
		ConditionOp::Lt => compare(&actual, &condition.value).is_some_and(|o| o == std::cmp::Ordering::Less),
		ConditionOp::Lte => compare(&actual, &condition.value).is_some_and(|o| o != std::cmp::Ordering::Greater),
		ConditionOp::In => condition.value.as_array().is_some_and(|values| values.contains(&actual)),
	}
}

fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
	actual.as_f64()?.partial_cmp(&expected.as_f64()?)
}

/// Parse a `trigger.clock` string of the form `HH:MM:SS` into a second
/// offset from game-clock zero. Malformed strings never match (never
/// panics on venue-authored content).
#[must_use]
pub fn parse_hhmmss(value: &str) -> Option<i64> {
	let mut parts = value.splitn(3, ':');
	let hours: i64 = parts.next()?.parse().ok()?;
	let minutes: i64 = parts.next()?.parse().ok()?;
	let seconds: i64 = parts.next()?.parse().ok()?;
	Some(hours * 3600 + minutes * 60 + seconds)
}
