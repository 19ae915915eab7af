//! Consent mapper: reduces every signal to one authorization decision.
//!
//! Pure and deterministic. Safe to call on every signal tick, including
//! redundant ones.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::consent::ConsentType;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Every required category is granted and the CMP permits.
    Allowed,
    /// Allowed only because the policy requires nothing. May mean the policy
    /// is unconfigured.
    AllowedUnconfiguredPolicy,
    /// At least one required category is not granted.
    MissingConsent,
    /// GDPR subject and the CMP has not finished initializing.
    CmpNotReady,
    /// GDPR subject, CMP ready, but no transparency string.
    CmpNoTransparencyString,
}

/// Output of the mapper. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub allow: bool,
    pub reason: DecisionReason,
}

impl AuthorizationDecision {
    pub fn is_unconfigured(&self) -> bool {
        self.reason == DecisionReason::AllowedUnconfiguredPolicy
    }
}

/// Compute the effective authorization.
///
/// `allow = (required ⊆ granted) && (!gdpr_subject || (cmp_ready && has_transparency_string))`
pub fn effective(
    granted: &BTreeSet<ConsentType>,
    required: &BTreeSet<ConsentType>,
    gdpr_subject: bool,
    cmp_ready: bool,
    has_transparency_string: bool,
) -> AuthorizationDecision {
    let policy_allows = required.is_subset(granted);
    let cmp_allows = !gdpr_subject || (cmp_ready && has_transparency_string);

    let reason = if !policy_allows {
        DecisionReason::MissingConsent
    } else if !cmp_allows {
        if cmp_ready {
            DecisionReason::CmpNoTransparencyString
        } else {
            DecisionReason::CmpNotReady
        }
    } else if required.is_empty() {
        DecisionReason::AllowedUnconfiguredPolicy
    } else {
        DecisionReason::Allowed
    };

    AuthorizationDecision {
        allow: policy_allows && cmp_allows,
        reason,
    }
}
