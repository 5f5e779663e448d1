//! Credit ledger types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free uses granted per cycle
pub const MAX_FREE_CREDITS: u32 = 3;

/// Length of a free-credit cycle, in hours
pub const RESET_PERIOD_HOURS: i64 = 24;

/// Operations that cost a credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    /// Password-protect a PDF
    Secure,
    /// Remove a PDF password
    Unlock,
    /// Vendor-side compression
    Compress,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Secure => "secure",
            ToolType::Unlock => "unlock",
            ToolType::Compress => "compress",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secure" | "encrypt" => Ok(ToolType::Secure),
            "unlock" | "decrypt" => Ok(ToolType::Unlock),
            "compress" => Ok(ToolType::Compress),
            other => Err(format!("Unknown tool: {}", other)),
        }
    }
}

/// Persisted wallet state for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRecord {
    pub free: u32,
    pub paid: u32,
    pub last_reset: DateTime<Utc>,
}

/// Balance snapshot returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub free: u32,
    pub paid: u32,
    pub total: u32,
    pub last_reset: DateTime<Utc>,
}

/// Which balance a debit was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditSource {
    Free,
    Paid,
}

impl CreditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditSource::Free => "free",
            CreditSource::Paid => "paid",
        }
    }
}

/// Result of applying a debit to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    /// A due reset was applied before the debit
    pub reset: bool,
    /// Balance the credit came from; `None` when both balances were empty
    pub source: Option<CreditSource>,
}

/// Result of a ledger deduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CreditSource>,
    pub balance: Balance,
}

/// Kind of ledger mutation recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Reset,
    Purchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Reset => "reset",
            TransactionKind::Purchase => "purchase",
        }
    }
}

/// Audit row for a ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub tool: Option<String>,
    pub source: Option<String>,
    pub amount: i64,
    pub reference: Option<String>,
    pub free_after: i64,
    pub paid_after: i64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_type_parsing_accepts_route_aliases() {
        assert_eq!("secure".parse::<ToolType>().unwrap(), ToolType::Secure);
        assert_eq!("Encrypt".parse::<ToolType>().unwrap(), ToolType::Secure);
        assert_eq!("decrypt".parse::<ToolType>().unwrap(), ToolType::Unlock);
        assert_eq!(" compress ".parse::<ToolType>().unwrap(), ToolType::Compress);
        assert!("merge".parse::<ToolType>().is_err());
    }

    #[test]
    fn test_tool_type_serde() {
        let json = serde_json::to_string(&ToolType::Unlock).unwrap();
        assert_eq!(json, "\"unlock\"");
    }
}
