use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::compliance::{risk_level_of, RiskLevel};
use crate::error::{codes, AppError};

/// Issuing body of a regulatory document.
///
/// Serialized as the upper-case short name used in citations (`"SEBI"`, `"RBI"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Regulator {
    #[serde(rename = "SEBI")]
    Sebi,
    #[serde(rename = "RBI")]
    Rbi,
    #[serde(rename = "NSE")]
    Nse,
    #[serde(rename = "BSE")]
    Bse,
    Other,
    Unknown,
}

impl Regulator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regulator::Sebi => "SEBI",
            Regulator::Rbi => "RBI",
            Regulator::Nse => "NSE",
            Regulator::Bse => "BSE",
            Regulator::Other => "Other",
            Regulator::Unknown => "Unknown",
        }
    }

    /// Case-insensitive parse; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sebi" => Regulator::Sebi,
            "rbi" => Regulator::Rbi,
            "nse" => Regulator::Nse,
            "bse" => Regulator::Bse,
            "other" => Regulator::Other,
            _ => Regulator::Unknown,
        }
    }
}

impl fmt::Display for Regulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const UNKNOWN_DOC_TYPE: &str = "Unknown";

/// Already-extracted regulatory text, tagged with its origin.
///
/// Notes:
/// - `id` is the source file name (e.g. `demat_account_guide.txt`) and is what citations show.
/// - Documents are immutable once stored; re-ingesting replaces the whole document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub regulator: Regulator,
    pub doc_type: String,
    pub text: String,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        regulator: Regulator,
        doc_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, AppError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::new(
                codes::DOCUMENT_INVALID,
                "Document identifier is required",
            ));
        }
        let doc_type = doc_type.into();
        let doc_type = if doc_type.trim().is_empty() {
            UNKNOWN_DOC_TYPE.to_string()
        } else {
            doc_type
        };
        Ok(Self {
            id,
            regulator,
            doc_type,
            text: text.into(),
        })
    }
}

/// Advisory attached to an answer when a regulated topic is detected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warning {
    pub category: String,
    pub pattern: String,
    #[serde(rename = "warning")]
    pub message: String,
}

/// Which document and chunk backed an answer.
///
/// `chunk` is 1-based ("chunk 2 of 5") to match the persisted answer format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceCitation {
    pub name: String,
    pub regulator: Regulator,
    pub doc_type: String,
    pub chunk: u32,
    pub total_chunks: u32,
}

/// Final response for one query. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResult {
    pub answer: String,
    pub warnings: Vec<Warning>,
    pub sources: Vec<SourceCitation>,
    pub timestamp: String,
    /// Present only on degraded results (generation or index failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Most severe tier among `warnings`.
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub disclaimer: String,
}

impl QueryResult {
    /// Result stamped with the current time, its risk tier derived from `warnings`.
    pub fn new(
        answer: impl Into<String>,
        warnings: Vec<Warning>,
        sources: Vec<SourceCitation>,
        error: Option<String>,
    ) -> Self {
        let mut result = Self {
            answer: answer.into(),
            warnings,
            sources,
            timestamp: now_rfc3339(),
            error,
            risk_level: RiskLevel::default(),
            disclaimer: String::new(),
        };
        result.assess_risk();
        result
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Recompute the risk tier and disclaimer after `warnings` changed.
    pub fn assess_risk(&mut self) {
        self.risk_level = risk_level_of(&self.warnings);
        self.disclaimer = self.risk_level.disclaimer().to_string();
    }
}

/// Current UTC time as RFC3339 (ISO-8601).
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regulator_serializes_as_short_name() {
        let json = serde_json::to_string(&Regulator::Sebi).unwrap();
        assert_eq!(json, "\"SEBI\"");
        assert_eq!(Regulator::parse("rbi"), Regulator::Rbi);
        assert_eq!(Regulator::parse("sec"), Regulator::Unknown);
    }

    #[test]
    fn warning_message_is_persisted_under_warning_key() {
        let w = Warning {
            category: "compliance".to_string(),
            pattern: "demat account".to_string(),
            message: "check broker".to_string(),
        };
        let v = serde_json::to_value(&w).unwrap();
        assert_eq!(v["warning"], "check broker");
        assert!(v.get("message").is_none());
    }

    #[test]
    fn blank_doc_type_becomes_unknown() {
        let d = Document::new("a.txt", Regulator::Unknown, "  ", "text").unwrap();
        assert_eq!(d.doc_type, UNKNOWN_DOC_TYPE);
        assert!(Document::new(" ", Regulator::Sebi, "x", "text").is_err());
    }

    #[test]
    fn result_carries_the_disclaimer_of_its_worst_warning() {
        let warn = |category: &str| Warning {
            category: category.to_string(),
            pattern: "p".to_string(),
            message: "m".to_string(),
        };
        let mut res = QueryResult::new("a", vec![warn("info"), warn("illegal")], vec![], None);
        assert_eq!(res.risk_level, RiskLevel::Illegal);
        assert_eq!(res.disclaimer, RiskLevel::Illegal.disclaimer());

        res.warnings.retain(|w| w.category == "info");
        res.assess_risk();
        assert_eq!(res.risk_level, RiskLevel::Info);

        // Entries written before risk tiers existed still load.
        let old = r#"{"answer":"a","warnings":[],"sources":[],"timestamp":"t"}"#;
        let res: QueryResult = serde_json::from_str(old).unwrap();
        assert_eq!(res.risk_level, RiskLevel::LowRisk);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let ts = now_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok());
    }
}
