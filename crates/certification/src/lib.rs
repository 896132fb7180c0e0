//! # Certification - Traceability Hashes for Graded Lots
//!
//! Canonical payloads and SHA-256 content hashes that certify a grading
//! result. The canonical form (exact key set, sorted keys, compact separators,
//! ASCII-escaped strings) is a compatibility contract: certificates issued by
//! earlier deployments must keep verifying.
//!
//! ## Example
//!
//! ```rust
//! use certification::{CertificationPayload, Identifier, certification_hash, verify_hash};
//!
//! let payload = CertificationPayload {
//!     session_id: Some(Identifier::Text("SESS-20250101-0001".into())),
//!     coffee_lot_id: Some(Identifier::Number(42)),
//!     final_score: Some(0.817),
//!     final_category: Some("Premium".into()),
//!     total_grains_analyzed: Some(3),
//!     timestamp: Some("2025-01-01T12:00:00+00:00".into()),
//!     processing_time: Some(1.25),
//! };
//!
//! let hash = certification_hash(&payload).unwrap();
//! assert_eq!(hash.len(), 64);
//! assert!(verify_hash(&payload, &hash));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use bean_grading::{BeanResult, ColorClass, LotReport};
use rand::{distributions::Alphanumeric, Rng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

// Re-exports for convenience
pub use chrono::{DateTime, Utc};

/// Result type for certification operations
pub type Result<T> = std::result::Result<T, CertificationError>;

/// Standard error type for certification operations
#[derive(Error, Debug)]
pub enum CertificationError {
    #[error("Certificate {certification_id} is already revoked")]
    AlreadyRevoked { certification_id: String },

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identifier that may have been issued as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Identifier {
    Number(i64),
    Text(String),
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Number(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_string())
    }
}

impl std::str::FromStr for Identifier {
    type Err = std::convert::Infallible;

    /// Integers become [`Identifier::Number`], anything else stays text.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(value
            .parse::<i64>()
            .map(Identifier::Number)
            .unwrap_or_else(|_| Identifier::Text(value.to_string())))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Number(n) => write!(f, "{n}"),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::Text(value)
    }
}

/// Fields covered by a lot certification hash. Missing fields hash as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CertificationPayload {
    pub session_id: Option<Identifier>,
    pub coffee_lot_id: Option<Identifier>,
    /// Lot score in [0, 1]
    pub final_score: Option<f64>,
    pub final_category: Option<String>,
    pub total_grains_analyzed: Option<u64>,
    /// ISO-8601 completion time
    pub timestamp: Option<String>,
    pub processing_time: Option<f64>,
}

/// Session metadata that accompanies a lot report into a certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    pub session_id: Identifier,
    pub coffee_lot_id: Identifier,
    pub completed_at: DateTime<Utc>,
    pub processing_time_seconds: Option<f64>,
}

impl CertificationPayload {
    /// Payload for a graded lot.
    pub fn from_report(report: &LotReport, session: &SessionInfo) -> Self {
        Self {
            session_id: Some(session.session_id.clone()),
            coffee_lot_id: Some(session.coffee_lot_id.clone()),
            final_score: Some(report.average_quality_score),
            final_category: Some(report.lot_quality.to_string()),
            total_grains_analyzed: Some(report.total_beans_analyzed as u64),
            timestamp: Some(isoformat(&session.completed_at)),
            processing_time: session.processing_time_seconds,
        }
    }

    /// Payload for a score reported on a 0-100 scale.
    pub fn with_percentage_score(mut self, quality_score: f64) -> Self {
        self.final_score = Some(quality_score / 100.0);
        self
    }

    /// Canonical JSON text that is hashed.
    pub fn canonical_json(&self) -> Result<String> {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("session_id", serde_json::to_value(&self.session_id)?);
        fields.insert("coffee_lot_id", serde_json::to_value(&self.coffee_lot_id)?);
        fields.insert("final_score", serde_json::to_value(self.final_score)?);
        fields.insert("final_category", serde_json::to_value(&self.final_category)?);
        fields.insert("total_grains_analyzed", serde_json::to_value(self.total_grains_analyzed)?);
        fields.insert("timestamp", serde_json::to_value(&self.timestamp)?);
        fields.insert("processing_time", serde_json::to_value(self.processing_time)?);
        canonical_string(&fields)
    }
}

/// Shape features as they appear in a grain hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GrainFeatures {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    /// Serialized as the strings `"True"` / `"False"`
    pub has_cracks: String,
}

/// Fields covered by a per-grain hash.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GrainRecord {
    pub grain_id: Option<Identifier>,
    pub color_percentages: Option<BTreeMap<ColorClass, f64>>,
    pub final_score: Option<f64>,
    pub final_category: Option<String>,
    pub features: Option<GrainFeatures>,
}

impl GrainRecord {
    pub fn from_bean(bean: &BeanResult, grain_id: Identifier) -> Self {
        Self {
            grain_id: Some(grain_id),
            color_percentages: bean
                .color_scores
                .as_ref()
                .map(|scores| scores.iter().collect()),
            final_score: Some(bean.assessment.final_score),
            final_category: Some(bean.assessment.quality_category.to_string()),
            features: Some(GrainFeatures {
                area: bean.features.area,
                perimeter: bean.features.perimeter,
                circularity: bean.features.circularity,
                has_cracks: if bean.features.has_cracks { "True" } else { "False" }.to_string(),
            }),
        }
    }

    pub fn canonical_json(&self) -> Result<String> {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("grain_id", serde_json::to_value(&self.grain_id)?);
        fields.insert("color_percentages", serde_json::to_value(&self.color_percentages)?);
        fields.insert("final_score", serde_json::to_value(self.final_score)?);
        fields.insert("final_category", serde_json::to_value(&self.final_category)?);
        fields.insert("features", serde_json::to_value(&self.features)?);
        canonical_string(&fields)
    }
}

/// Compact JSON with every object's keys sorted and non-ASCII escaped.
fn canonical_string(fields: &BTreeMap<&str, Value>) -> Result<String> {
    let sorted: BTreeMap<&str, Value> = fields
        .iter()
        .map(|(key, value)| (*key, sort_keys(value.clone())))
        .collect();
    let compact = serde_json::to_string(&sorted)?;
    Ok(escape_non_ascii(&compact))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let keys: BTreeSet<String> = map.keys().cloned().collect();
            let mut map = map;
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(inner) = map.remove(&key) {
                    sorted.insert(key, sort_keys(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn escape_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Lowercase hex SHA-256 of the payload's canonical JSON.
pub fn certification_hash(payload: &CertificationPayload) -> Result<String> {
    Ok(sha256_hex(&payload.canonical_json()?))
}

/// Whether `provided_hash` certifies `payload`.
pub fn verify_hash(payload: &CertificationPayload, provided_hash: &str) -> bool {
    certification_hash(payload)
        .map(|hash| hash.eq_ignore_ascii_case(provided_hash.trim()))
        .unwrap_or(false)
}

/// Lowercase hex SHA-256 of one grain's canonical JSON.
pub fn hash_grain_data(grain: &GrainRecord) -> Result<String> {
    Ok(sha256_hex(&grain.canonical_json()?))
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 12-character alphanumeric token for public verification links.
pub fn generate_verification_token() -> String {
    random_alphanumeric(12)
}

/// ISO-8601 timestamp with a `+00:00` offset, microseconds only when non-zero.
pub fn isoformat(timestamp: &DateTime<Utc>) -> String {
    let format = if timestamp.timestamp_subsec_micros() == 0 {
        chrono::SecondsFormat::Secs
    } else {
        chrono::SecondsFormat::Micros
    };
    timestamp.to_rfc3339_opts(format, false)
}

/// Lifecycle of an issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificationStatus {
    Active,
    Verified,
    Revoked,
}

/// An issued certificate: the hashed payload plus its public handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Certificate {
    pub certification_id: String,
    pub certification_hash: String,
    pub verification_token: String,
    pub payload: CertificationPayload,
    pub status: CertificationStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

impl Certificate {
    /// Hash `payload` and mint identifiers for it.
    pub fn issue(payload: CertificationPayload, expires_in_days: Option<i64>) -> Result<Self> {
        let certification_hash = certification_hash(&payload)?;
        let issued_at = Utc::now();
        let expires_at = match expires_in_days {
            Some(days) if days <= 0 => {
                return Err(CertificationError::InvalidValue {
                    message: format!("expiry must be positive, got {days} days"),
                })
            }
            Some(days) => Some(issued_at + chrono::Duration::days(days)),
            None => None,
        };

        Ok(Self {
            certification_id: format!("CERT-{}", random_alphanumeric(12).to_uppercase()),
            certification_hash,
            verification_token: generate_verification_token(),
            payload,
            status: CertificationStatus::Active,
            issued_at,
            expires_at,
            revocation_reason: None,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    /// Neither revoked nor expired at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status != CertificationStatus::Revoked && !self.is_expired(now)
    }

    /// Re-hash the stored payload and compare with the issued hash.
    pub fn verify(&mut self) -> bool {
        self.verify_at(Utc::now())
    }

    /// [`Certificate::verify`] against an explicit clock.
    pub fn verify_at(&mut self, now: DateTime<Utc>) -> bool {
        let valid = self.is_valid(now) && verify_hash(&self.payload, &self.certification_hash);
        if valid {
            self.status = CertificationStatus::Verified;
        }
        valid
    }

    pub fn revoke(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.status == CertificationStatus::Revoked {
            return Err(CertificationError::AlreadyRevoked {
                certification_id: self.certification_id.clone(),
            });
        }
        self.status = CertificationStatus::Revoked;
        self.revocation_reason = Some(reason.into());
        Ok(())
    }
}
