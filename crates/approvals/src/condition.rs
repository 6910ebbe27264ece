//! Typed approval-rule conditions.
//!
//! Conditions are validated when configuration is loaded, not when a
//! requisition is created: `RuleCondition::parse` turns the textual form
//! (`"totalAmount > 1000"`) into a comparison node over a named-field
//! registry, and evaluation never touches text again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requisition attributes a condition can reference, computed at creation
/// time. New comparable attributes are added here and in [`RuleField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequisitionFacts {
    /// Σ estimated line totals, in smallest currency unit.
    pub total_amount: u64,
}

/// Named-field registry of comparable requisition attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleField {
    TotalAmount,
}

impl RuleField {
    pub fn name(&self) -> &'static str {
        match self {
            RuleField::TotalAmount => "totalAmount",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "totalAmount" => Some(Self::TotalAmount),
            _ => None,
        }
    }

    fn value(&self, facts: &RequisitionFacts) -> u64 {
        match self {
            RuleField::TotalAmount => facts.total_amount,
        }
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
        }
    }

    fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "==" | "=" => Some(Self::Eq),
            _ => None,
        }
    }

    fn apply(&self, lhs: u64, rhs: u64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }
}

/// Rejected rule-condition configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleConfigError {
    #[error("unknown field '{0}' in rule condition")]
    UnknownField(String),

    #[error("unknown operator '{0}' in rule condition")]
    UnknownOperator(String),

    #[error("invalid threshold '{0}' in rule condition")]
    InvalidThreshold(String),

    #[error("malformed rule condition '{0}'")]
    Malformed(String),
}

/// A rule condition, validated at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCondition {
    /// Applies unconditionally.
    Always,
    Compare {
        field: RuleField,
        op: CompareOp,
        /// Threshold in smallest currency unit, same unit as the facts.
        value: u64,
    },
}

impl RuleCondition {
    /// Parse the textual configuration form: `<field> <op> <value>`.
    pub fn parse(expr: &str) -> Result<Self, RuleConfigError> {
        let trimmed = expr.trim();
        let mut parts = trimmed.split_whitespace();
        let (Some(field), Some(op), Some(value), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(RuleConfigError::Malformed(trimmed.to_string()));
        };

        let field =
            RuleField::parse(field).ok_or_else(|| RuleConfigError::UnknownField(field.to_string()))?;
        let op = CompareOp::parse(op)
            .ok_or_else(|| RuleConfigError::UnknownOperator(op.to_string()))?;
        let value = value
            .parse::<u64>()
            .map_err(|_| RuleConfigError::InvalidThreshold(value.to_string()))?;

        Ok(Self::Compare { field, op, value })
    }

    pub fn evaluate(&self, facts: &RequisitionFacts) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::Compare { field, op, value } => op.apply(field.value(facts), *value),
        }
    }
}

impl core::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RuleCondition::Always => write!(f, "always"),
            RuleCondition::Compare { field, op, value } => {
                write!(f, "{} {} {}", field.name(), op.symbol(), value)
            }
        }
    }
}
