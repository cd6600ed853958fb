//! Privacy masking applied to query results before they cross the trust
//! boundary toward a language model.
//!
//! Masking is a pure transformation over a `QueryResult`: field selection by
//! normalized substring match against aliases, value replacement that keeps
//! type-appropriate shape, and (at the highest level) a heuristic for
//! personal names in values. Structural metadata (record count, record
//! order, pagination, identifier fields) is never touched.

use crate::error::{GatewayError, GatewayResult};
use crate::types::{QueryResult, Record, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Ordered redaction levels; each level masks a strict superset of the one
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskingLevel {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for MaskingLevel {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(GatewayError::MaskingConfig(format!(
                "unknown masking level '{}'",
                other
            ))),
        }
    }
}

// Built-in field matchers. Levels are cumulative: medium includes low,
// high includes medium.
const LOW_MATCHERS: &[&str] = &[
    "password",
    "secret",
    "ssn",
    "social_security",
    "credit_card",
    "card_number",
    "account_number",
    "routing_number",
    "api_key",
    "token",
];

const MEDIUM_MATCHERS: &[&str] = &[
    "email",
    "phone",
    "address",
    "date_of_birth",
    "dob",
    "salary",
    "compensation",
    "bank",
];

const HIGH_MATCHERS: &[&str] = &[
    "name",
    "owner",
    "manager",
    "reviewer",
    "approver",
    "contact",
    "employee",
];

const MASK_RUN: &str = "****";

/// A redaction policy: a level plus optional custom field matchers that
/// apply at every level. Pure configuration, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingPolicy {
    pub level: MaskingLevel,
    #[serde(default)]
    pub field_matchers: Vec<String>,
}

impl MaskingPolicy {
    pub fn new(level: MaskingLevel, field_matchers: Vec<String>) -> GatewayResult<Self> {
        let policy = Self {
            level,
            field_matchers,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// A policy with the built-in matchers only.
    pub fn for_level(level: MaskingLevel) -> Self {
        Self {
            level,
            field_matchers: Vec::new(),
        }
    }

    pub fn validate(&self) -> GatewayResult<()> {
        for matcher in &self.field_matchers {
            if matcher.trim().is_empty() {
                return Err(GatewayError::MaskingConfig(
                    "field matcher patterns must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// All matchers active at this policy's level, normalized.
    fn active_matchers(&self) -> Vec<String> {
        let mut matchers: Vec<String> = LOW_MATCHERS.iter().map(|m| normalize(m)).collect();
        if self.level >= MaskingLevel::Medium {
            matchers.extend(MEDIUM_MATCHERS.iter().map(|m| normalize(m)));
        }
        if self.level >= MaskingLevel::High {
            matchers.extend(HIGH_MATCHERS.iter().map(|m| normalize(m)));
        }
        matchers.extend(self.field_matchers.iter().map(|m| normalize(m)));
        matchers
    }

    /// Whether a field alias is selected for masking under this policy.
    pub fn matches_field(&self, alias: &str) -> bool {
        if is_identifier(alias) {
            return false;
        }
        let normalized = normalize(alias);
        self.active_matchers()
            .iter()
            .any(|m| normalized.contains(m.as_str()))
    }
}

impl Default for MaskingPolicy {
    fn default() -> Self {
        Self::for_level(MaskingLevel::Medium)
    }
}

/// Per-tenant policy resolution with a configurable default.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    default: MaskingPolicy,
    overrides: HashMap<String, MaskingPolicy>,
}

impl PolicyStore {
    pub fn new(default: MaskingPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn set_tenant_policy(&mut self, tenant_id: impl Into<String>, policy: MaskingPolicy) {
        self.overrides.insert(tenant_id.into(), policy);
    }

    pub fn for_tenant(&self, tenant_id: &TenantId) -> &MaskingPolicy {
        self.overrides.get(tenant_id.as_str()).unwrap_or(&self.default)
    }
}

/// Apply a policy to a query result. Pure; structural metadata (counts,
/// ordering, pagination) passes through unchanged.
pub fn mask(result: QueryResult, policy: &MaskingPolicy) -> QueryResult {
    let records = result
        .records
        .into_iter()
        .map(|record| mask_record(record, policy))
        .collect();

    QueryResult {
        records,
        total_count: result.total_count,
        page: result.page,
        page_size: result.page_size,
    }
}

fn mask_record(record: Record, policy: &MaskingPolicy) -> Record {
    let mut masked = serde_json::Map::new();
    for (alias, value) in record.0 {
        let value = if policy.matches_field(&alias) {
            mask_value(&value)
        } else if policy.level >= MaskingLevel::High && !is_identifier(&alias) {
            mask_person_names(value)
        } else {
            value
        };
        masked.insert(alias, value);
    }
    Record(masked)
}

/// Replace a value while keeping its kind recognizable.
fn mask_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(mask_string(s)),
        Value::Number(_) => Value::String("[masked:number]".to_string()),
        Value::Bool(_) => Value::String("[masked:boolean]".to_string()),
        Value::Array(_) => Value::String("[masked:list]".to_string()),
        Value::Object(_) => Value::String("[masked:object]".to_string()),
    }
}

/// Short strings are replaced wholly; longer ones keep a two-character
/// prefix and suffix around a fixed masked run.
fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return MASK_RUN.to_string();
    }
    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", prefix, MASK_RUN, suffix)
}

/// Heuristic used at the high level: a value of exactly two capitalized
/// alphabetic tokens is treated as a personal name.
fn looks_like_person_name(s: &str) -> bool {
    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() != 2 {
        return false;
    }
    tokens.iter().all(|token| {
        let mut chars = token.chars();
        match chars.next() {
            Some(first) if first.is_uppercase() => chars.all(|c| c.is_lowercase()),
            _ => false,
        }
    })
}

fn mask_person_names(value: Value) -> Value {
    match value {
        Value::String(s) if looks_like_person_name(&s) => Value::String(mask_string(&s)),
        other => other,
    }
}

/// Identifier fields are never masked so results stay joinable.
fn is_identifier(alias: &str) -> bool {
    let normalized = normalize(alias);
    normalized == "id" || normalized.ends_with("_id")
}

/// Case-insensitive comparison form tolerating space/underscore variants.
fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}
