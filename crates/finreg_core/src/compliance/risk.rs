//! Risk tiers, disclaimers and the static lookups that go with them.

use serde::{Deserialize, Serialize};

use super::{
    PatternTable, CATEGORY_COMPLIANCE, CATEGORY_HIGH_RISK, CATEGORY_ILLEGAL, CATEGORY_INFO,
    CATEGORY_MEDIUM_RISK,
};
use crate::domain::Warning;

/// Overall risk of a question, from the most severe warning it triggered.
///
/// Variants are declared from least to most severe so `Ord` ranks them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    LowRisk,
    Info,
    MediumRisk,
    HighRisk,
    Illegal,
}

impl RiskLevel {
    /// Tier for a warning category. Account-opening guidance counts as `Info`;
    /// response checks and unknown categories carry no tier.
    pub fn from_category(category: &str) -> Option<Self> {
        match category {
            CATEGORY_ILLEGAL => Some(Self::Illegal),
            CATEGORY_HIGH_RISK => Some(Self::HighRisk),
            CATEGORY_MEDIUM_RISK => Some(Self::MediumRisk),
            CATEGORY_COMPLIANCE | CATEGORY_INFO => Some(Self::Info),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowRisk => "low_risk",
            Self::Info => "info",
            Self::MediumRisk => "medium_risk",
            Self::HighRisk => "high_risk",
            Self::Illegal => "illegal",
        }
    }

    pub fn disclaimer(self) -> &'static str {
        match self {
            Self::Illegal => "WARNING: This activity is illegal under Indian securities law.",
            Self::HighRisk => "HIGH RISK WARNING: This activity can result in significant financial losses.",
            Self::MediumRisk => "RISK WARNING: This investment carries moderate risk.",
            Self::LowRisk => "Please ensure you follow all SEBI guidelines and regulations.",
            Self::Info => "This is for informational purposes only. Consult a SEBI-registered advisor.",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most severe tier among `warnings`; `LowRisk` when none carries a tier.
pub fn risk_level_of(warnings: &[Warning]) -> RiskLevel {
    warnings
        .iter()
        .filter_map(|w| RiskLevel::from_category(&w.category))
        .max()
        .unwrap_or_default()
}

impl PatternTable {
    /// Risk tier of free text under this table.
    pub fn risk_level(&self, text: &str) -> RiskLevel {
        risk_level_of(&self.scan(&[text]))
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PenaltyInfo {
    pub monetary: &'static str,
    pub criminal: &'static str,
    pub other: &'static str,
}

const PENALTIES: &[(&str, PenaltyInfo)] = &[
    (
        "insider_trading",
        PenaltyInfo {
            monetary: "Up to ₹25 crores or 3 times the profit made",
            criminal: "Up to 10 years imprisonment",
            other: "Debarment from markets, disgorgement of profits",
        },
    ),
    (
        "market_manipulation",
        PenaltyInfo {
            monetary: "Up to ₹25 crores",
            criminal: "Up to 10 years imprisonment",
            other: "Cancellation of broker license",
        },
    ),
    (
        "front_running",
        PenaltyInfo {
            monetary: "Up to ₹1 crore",
            criminal: "Prosecution under SEBI Act",
            other: "Suspension of trading rights",
        },
    ),
    (
        "kyc_violation",
        PenaltyInfo {
            monetary: "₹10,000 per day of violation",
            criminal: "Not applicable",
            other: "Account freeze, trading suspension",
        },
    ),
];

const DEFAULT_PENALTY: PenaltyInfo = PenaltyInfo {
    monetary: "As per SEBI regulations",
    criminal: "As per applicable laws",
    other: "As determined by SEBI",
};

/// Penalties for a violation key such as `insider_trading`. Keys are matched
/// after trimming and lowercasing; spaces and dashes are read as underscores.
pub fn penalty_info(violation: &str) -> PenaltyInfo {
    let key: String = violation
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    PENALTIES
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(DEFAULT_PENALTY, |(_, p)| *p)
}

pub const SEBI_REGISTRY_URL: &str =
    "https://www.sebi.gov.in/sebiweb/other/OtherAction.do?doRecognisedFpi=yes";

const REGISTERED_BROKERS: &[&str] = &[
    "zerodha",
    "upstox",
    "groww",
    "angel one",
    "hdfc securities",
    "icici direct",
    "kotak securities",
    "motilal oswal",
    "5paisa",
    "sharekhan",
    "edelweiss",
    "axis direct",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerCheck {
    pub is_registered: bool,
    pub message: String,
    pub check_url: String,
}

/// Whether `broker_name` mentions a broker on the known SEBI-registered list.
/// A miss is not proof of anything; the message points at the registry.
pub fn check_broker_registration(broker_name: &str) -> BrokerCheck {
    let name = broker_name.to_lowercase();
    let is_registered = !name.trim().is_empty() && REGISTERED_BROKERS.iter().any(|b| name.contains(b));
    BrokerCheck {
        is_registered,
        message: if is_registered {
            "SEBI Registered Broker".to_string()
        } else {
            "Please verify SEBI registration".to_string()
        },
        check_url: SEBI_REGISTRY_URL.to_string(),
    }
}
