//! Correlation token codec.
//!
//! A correlation token links an asynchronous gateway callback back to the
//! user and plan that started the checkout. It travels through the gateway
//! as the opaque `external_reference` string and comes back unmodified.
//!
//! # Format
//!
//! ```text
//! lt1.<base64url(user_id)>.<base64url(plan)>.<kind>
//! ```
//!
//! Fields are unpadded base64url, whose alphabet excludes `.`, so user ids
//! containing `-`, `:` or `.` can never shift a field boundary. This module is
//! the only place tokens are built or parsed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::UserId;

use super::Plan;

const VERSION_TAG: &str = "lt1";
const SEPARATOR: char = '.';
const FIELD_COUNT: usize = 4;

/// How the checkout was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    OneTimePayment,
    Subscription,
}

impl TransactionKind {
    fn code(&self) -> &'static str {
        match self {
            TransactionKind::OneTimePayment => "otp",
            TransactionKind::Subscription => "sub",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "otp" => Some(TransactionKind::OneTimePayment),
            "sub" => Some(TransactionKind::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::OneTimePayment => f.write_str("one_time_payment"),
            TransactionKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Decoded form of a gateway `external_reference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationToken {
    pub user_id: UserId,
    pub plan: Plan,
    pub kind: TransactionKind,
}

impl CorrelationToken {
    pub fn new(user_id: UserId, plan: Plan, kind: TransactionKind) -> Self {
        Self {
            user_id,
            plan,
            kind,
        }
    }
}

/// Why an external reference could not be decoded.
///
/// Every variant is terminal: retrying cannot repair the token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed correlation token: {0}")]
    Malformed(String),

    #[error("correlation token names unknown plan: {0}")]
    UnknownPlan(String),

    #[error("correlation token names unknown transaction kind: {0}")]
    UnknownKind(String),
}

/// Builds and parses correlation tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCodec;

impl ReferenceCodec {
    pub fn encode(&self, token: &CorrelationToken) -> String {
        format!(
            "{tag}{sep}{user}{sep}{plan}{sep}{kind}",
            tag = VERSION_TAG,
            sep = SEPARATOR,
            user = URL_SAFE_NO_PAD.encode(token.user_id.as_str()),
            plan = URL_SAFE_NO_PAD.encode(token.plan.as_str()),
            kind = token.kind.code(),
        )
    }

    /// # Errors
    ///
    /// - `Malformed` on wrong field count, version tag or field encoding
    /// - `UnknownPlan` if the plan segment decodes to no known plan
    /// - `UnknownKind` if the kind segment is neither `otp` nor `sub`
    pub fn decode(&self, raw: &str) -> Result<CorrelationToken, DecodeError> {
        let fields: Vec<&str> = raw.split(SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(DecodeError::Malformed(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            )));
        }
        if fields[0] != VERSION_TAG {
            return Err(DecodeError::Malformed(format!(
                "unsupported version tag '{}'",
                fields[0]
            )));
        }

        let user_id = UserId::new(decode_field("user_id", fields[1])?)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let plan_raw = decode_field("plan", fields[2])?;
        let plan = plan_raw
            .parse::<Plan>()
            .map_err(|_| DecodeError::UnknownPlan(plan_raw))?;
        let kind = TransactionKind::from_code(fields[3])
            .ok_or_else(|| DecodeError::UnknownKind(fields[3].to_string()))?;

        Ok(CorrelationToken::new(user_id, plan, kind))
    }
}

fn decode_field(name: &str, segment: &str) -> Result<String, DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| DecodeError::Malformed(format!("{} is not base64url: {}", name, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| DecodeError::Malformed(format!("{} is not valid UTF-8", name)))
}
