use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Business area an AI call belongs to. Scopes caching, the model registry
/// and governance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiDomain {
    Resume,
    Interview,
    Wellbeing,
    Documents,
    Audit,
    General,
}

impl AiDomain {
    pub const SEEDED: [AiDomain; 5] = [
        AiDomain::Resume,
        AiDomain::Interview,
        AiDomain::Wellbeing,
        AiDomain::Audit,
        AiDomain::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiDomain::Resume => "resume",
            AiDomain::Interview => "interview",
            AiDomain::Wellbeing => "wellbeing",
            AiDomain::Documents => "documents",
            AiDomain::Audit => "audit",
            AiDomain::General => "general",
        }
    }
}

impl fmt::Display for AiDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume" => Ok(AiDomain::Resume),
            "interview" => Ok(AiDomain::Interview),
            "wellbeing" => Ok(AiDomain::Wellbeing),
            "documents" => Ok(AiDomain::Documents),
            "audit" => Ok(AiDomain::Audit),
            "general" => Ok(AiDomain::General),
            other => Err(format!("unknown AI domain '{other}'")),
        }
    }
}

/// Human review state of a governance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

/// A sanctioned model configuration for one domain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelRegistryRow {
    pub id: Uuid,
    pub domain: String,
    pub version: String,
    pub model_name: String,
    pub prompt_template: Option<String>,
    pub parameters: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per AI invocation. Immutable except for the reviewer fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EthicalAuditLogRow {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub domain: String,
    pub request_id: Uuid,
    /// `None` when no registry entry was active for the domain at call time.
    pub model_version_id: Option<Uuid>,
    pub model_version: String,
    pub model_name: String,
    pub input_summary: Value,
    pub output_data: Value,
    pub confidence_score: Option<f64>,
    pub bias_score: f64,
    pub flagged_for_review: bool,
    pub ethical_checks: Value,
    pub reviewer_id: Option<Uuid>,
    pub review_status: String,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trips_through_its_string_form() {
        for domain in AiDomain::SEEDED.into_iter().chain([AiDomain::General]) {
            assert_eq!(domain.as_str().parse::<AiDomain>().unwrap(), domain);
            assert_eq!(
                serde_json::to_value(domain).unwrap(),
                serde_json::Value::String(domain.to_string())
            );
        }
    }

    #[test]
    fn test_review_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ReviewStatus::Approved).unwrap(),
            serde_json::json!("approved")
        );
    }
}
