//! Rule table for regulated topics and the annotator that applies it.
//!
//! A table row is `(category, pattern, message)`. Patterns are regexes matched
//! case-insensitively. Both the built-in tables and the ones loaded from the
//! configuration are compiled once and never mutated afterwards.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::domain::Warning;
use crate::error::{codes, AppError};

mod risk;

pub use risk::{
    check_broker_registration, penalty_info, risk_level_of, BrokerCheck, PenaltyInfo, RiskLevel,
    SEBI_REGISTRY_URL,
};

pub const CATEGORY_ILLEGAL: &str = "illegal";
pub const CATEGORY_HIGH_RISK: &str = "high_risk";
pub const CATEGORY_MEDIUM_RISK: &str = "medium_risk";
pub const CATEGORY_COMPLIANCE: &str = "compliance";
pub const CATEGORY_INFO: &str = "info";
pub const CATEGORY_RESPONSE_CHECK: &str = "response_check";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRecord {
    pub category: String,
    pub pattern: String,
    pub message: String,
}

impl PatternRecord {
    fn new(category: &str, pattern: &str, message: &str) -> Self {
        Self {
            category: category.to_string(),
            pattern: pattern.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    record: PatternRecord,
    regex: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rows: Vec<CompiledPattern>,
}

impl PatternTable {
    pub fn compile(records: &[PatternRecord]) -> Result<Self, AppError> {
        let mut rows = Vec::with_capacity(records.len());
        for rec in records {
            if rec.category.trim().is_empty() || rec.pattern.trim().is_empty() {
                return Err(AppError::new(
                    codes::CONFIG_INVALID,
                    "Compliance pattern requires a category and a pattern",
                )
                .with_details(format!("category={:?}; pattern={:?}", rec.category, rec.pattern)));
            }
            let regex = RegexBuilder::new(&rec.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    AppError::new(codes::CONFIG_INVALID, "Invalid compliance pattern")
                        .with_details(format!("pattern={}; err={}", rec.pattern, e))
                })?;
            rows.push(CompiledPattern {
                record: rec.clone(),
                regex,
            });
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &PatternRecord> {
        self.rows.iter().map(|r| &r.record)
    }

    /// One warning per row matching any of `texts`, in table order.
    pub fn scan(&self, texts: &[&str]) -> Vec<Warning> {
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut out = Vec::new();
        for row in self.rows.iter() {
            let key = (row.record.category.as_str(), row.record.pattern.as_str());
            if seen.contains(&key) {
                continue;
            }
            if texts.iter().any(|t| row.regex.is_match(t)) {
                seen.insert(key);
                out.push(Warning {
                    category: row.record.category.clone(),
                    pattern: row.record.pattern.clone(),
                    message: row.record.message.clone(),
                });
            }
        }
        out
    }
}

/// Attaches compliance warnings for the query and the retrieved passages.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceAnnotator<'a> {
    table: &'a PatternTable,
}

impl<'a> ComplianceAnnotator<'a> {
    pub fn new(table: &'a PatternTable) -> Self {
        Self { table }
    }

    pub fn annotate(&self, query: &str, chunk_texts: &[&str]) -> Vec<Warning> {
        let mut texts: Vec<&str> = Vec::with_capacity(chunk_texts.len() + 1);
        texts.push(query);
        texts.extend_from_slice(chunk_texts);
        let warnings = self.table.scan(&texts);
        if !warnings.is_empty() {
            tracing::debug!(count = warnings.len(), "compliance warnings attached");
        }
        warnings
    }
}

pub fn default_pattern_records() -> Vec<PatternRecord> {
    vec![
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"insider\s+trading",
            "ILLEGAL: Insider trading violates SEBI (Prohibition of Insider Trading) Regulations 2015. Penalty up to Rs 25 crores or 3x profit.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"front[\s-]?running",
            "ILLEGAL: Front-running is market manipulation under the SEBI Act. Can lead to license cancellation.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"pump\s+and\s+dump",
            "ILLEGAL: Market manipulation schemes are strictly prohibited under the SEBI Act.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"ponzi|pyramid\s+scheme|mlm\s+investment",
            "ILLEGAL: Such schemes are banned by SEBI. Report to authorities immediately.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"circular\s+trading",
            "ILLEGAL: Circular trading is market manipulation and prohibited.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"wash\s+trading",
            "ILLEGAL: Wash trading creates false market activity and is prohibited.",
        ),
        PatternRecord::new(
            CATEGORY_ILLEGAL,
            r"fake\s+identit|fake.*demat|someone\s+else.*account|benami",
            "ILLEGAL: Opening or operating accounts with a fake or borrowed identity violates KYC norms and the Benami Act. Expect account freeze, penalties and criminal prosecution.",
        ),
        PatternRecord::new(
            CATEGORY_HIGH_RISK,
            r"margin\s+trading|leverage",
            "HIGH RISK: Margin trading can lead to losses exceeding your investment.",
        ),
        PatternRecord::new(
            CATEGORY_HIGH_RISK,
            r"f&o|futures|options|derivatives",
            "HIGH RISK: Derivatives can cause unlimited losses. Requires experience and income proof.",
        ),
        PatternRecord::new(
            CATEGORY_HIGH_RISK,
            r"penny\s+stocks?|small[\s-]?cap",
            "HIGH RISK: Highly volatile and often manipulated. Research thoroughly.",
        ),
        PatternRecord::new(
            CATEGORY_HIGH_RISK,
            r"intraday|day\s+trading",
            "HIGH RISK: Most day traders lose money. Requires experience and discipline.",
        ),
        PatternRecord::new(
            CATEGORY_MEDIUM_RISK,
            r"grey\s+market|kostak",
            "MEDIUM RISK: Grey market trading is unregulated and risky.",
        ),
        PatternRecord::new(
            CATEGORY_MEDIUM_RISK,
            r"\bbtst\b|\batst\b",
            "MEDIUM RISK: BTST carries auction risk if the seller defaults.",
        ),
        PatternRecord::new(
            CATEGORY_MEDIUM_RISK,
            r"crypto|bitcoin",
            "MEDIUM RISK: Crypto is unregulated in India. 30% tax + 1% TDS applies.",
        ),
        PatternRecord::new(
            CATEGORY_COMPLIANCE,
            r"demat account|trading account",
            "Ensure your broker is SEBI registered. Check at www.sebi.gov.in",
        ),
        PatternRecord::new(
            CATEGORY_INFO,
            r"\bipo\b|initial\s+public\s+offering",
            "Read the Red Herring Prospectus carefully. Check SEBI SCORES for complaints.",
        ),
        PatternRecord::new(
            CATEGORY_INFO,
            r"\btips\b|recommendations|advisory",
            "Only take advice from SEBI-registered investment advisors.",
        ),
        PatternRecord::new(
            CATEGORY_INFO,
            r"\bpan\b|\bkyc\b",
            "PAN and KYC are mandatory for all market transactions.",
        ),
    ]
}

pub fn default_response_pattern_records() -> Vec<PatternRecord> {
    vec![
        PatternRecord::new(
            CATEGORY_RESPONSE_CHECK,
            r"you\s+can.*insider\s+trad",
            "COMPLIANCE CHECK: Response should not encourage insider trading",
        ),
        PatternRecord::new(
            CATEGORY_RESPONSE_CHECK,
            r"easy.*manipulat.*market",
            "COMPLIANCE CHECK: Response should not suggest market manipulation",
        ),
        PatternRecord::new(
            CATEGORY_RESPONSE_CHECK,
            r"avoid.*tax.*illegal",
            "COMPLIANCE CHECK: Response should not suggest tax evasion",
        ),
    ]
}

static DEFAULT_PATTERNS: OnceLock<Result<PatternTable, AppError>> = OnceLock::new();
static DEFAULT_RESPONSE_PATTERNS: OnceLock<Result<PatternTable, AppError>> = OnceLock::new();

/// Built-in query/passage table, compiled on first use.
pub fn default_patterns() -> Result<&'static PatternTable, AppError> {
    DEFAULT_PATTERNS
        .get_or_init(|| PatternTable::compile(&default_pattern_records()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Built-in table applied to generated answers.
pub fn default_response_patterns() -> Result<&'static PatternTable, AppError> {
    DEFAULT_RESPONSE_PATTERNS
        .get_or_init(|| PatternTable::compile(&default_response_pattern_records()))
        .as_ref()
        .map_err(Clone::clone)
}
