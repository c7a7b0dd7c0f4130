//! Query safety gate
//!
//! Consulted once per query, after retrieval and before generation. The gate
//! is layered:
//! 1. intent patterns for self-diagnosis, personal treatment and prescribing
//! 2. a co-occurrence heuristic (first-person reference + clinical action)
//! 3. medical-term detection, handled by a named [`MedicalTermPolicy`]
//! 4. an evidence requirement over the retrieved passages
//!
//! Layers 1 and 2 deny under every policy. Keyword layers are heuristics:
//! absence of a keyword never allows a query on its own, since layer 4 still
//! applies.

use crate::config::SafetyConfig;
use crate::error::{DocqaError, Result};
use crate::retrieval::ScoredPassage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target used for safety audit log lines
pub const AUDIT_TARGET: &str = "docqa::audit";

const SELF_DIAGNOSIS: &[&str] = &[
    r"\b(do|could|might|can) i have\b",
    r"\bdiagnose me\b",
    r"\bwhat('s| is) wrong with me\b",
    r"\bam i (sick|ill|infected|dying)\b",
];

const PERSONAL_TREATMENT: &[&str] = &[
    r"\bwhat should i do\b",
    r"\bhow (do|should|can) i treat (myself|my)\b",
    r"\bshould i (take|stop taking|use)\b",
];

const PRESCRIBING: &[&str] = &[
    r"\bwhat (medicine|medication|drug|dose|dosage) should i (take|use)\b",
    r"\bprescribe (me|for me)\b",
    r"\b(can|could|will|would) you prescribe\b",
];

/// A bare `i` must not be followed by `.`, so "i.e." is not a self-reference
const FIRST_PERSON: &str = r"\bi(?:$|[^\w.])|\b(?:im|me|my|myself)\b";

const CLINICAL_ACTION: &str =
    r"\b(take|taking|treat|treating|treatment|cure|medicate|stop taking|prescri\w*|diagnos\w*|symptoms?)\b";

const MEDICAL_TERMS: &[&str] = &[r"\bdiagnos\w*", r"\bprescri\w*", r"\bmedical advice\b"];

/// What the gate does when a medical or diagnostic term is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalTermPolicy {
    /// Refuse the query
    #[default]
    Deny,
    /// Let the query through and record the term on the audit target
    AllowWithAudit,
}

impl FromStr for MedicalTermPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "deny" => Ok(Self::Deny),
            "allow_with_audit" => Ok(Self::AllowWithAudit),
            other => Err(format!(
                "Unknown medical term policy '{}' (expected 'deny' or 'allow_with_audit')",
                other
            )),
        }
    }
}

/// Category of a personal-medical intent pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SelfDiagnosis,
    PersonalTreatment,
    Prescribing,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfDiagnosis => f.write_str("self-diagnosis"),
            Self::PersonalTreatment => f.write_str("personal treatment"),
            Self::Prescribing => f.write_str("prescribing"),
        }
    }
}

/// Why a query was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    PersonalIntent(Intent),
    ClinicalSelfReference,
    MedicalTerm(String),
    NoEvidence,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersonalIntent(intent) => write!(f, "{} request", intent),
            Self::ClinicalSelfReference => f.write_str("personal clinical question"),
            Self::MedicalTerm(term) => write!(f, "medical term '{}'", term),
            Self::NoEvidence => f.write_str("no supporting evidence retrieved"),
        }
    }
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(DenyReason),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

struct IntentPattern {
    intent: Intent,
    regex: Regex,
}

/// Layered query safety policy
pub struct SafetyGate {
    intents: Vec<IntentPattern>,
    first_person: Regex,
    clinical_action: Regex,
    medical_terms: Vec<Regex>,
    policy: MedicalTermPolicy,
    require_evidence: bool,
    min_evidence_confidence: f32,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| DocqaError::Config(format!("Invalid safety pattern '{}': {}", pattern, e)))
}

impl SafetyGate {
    pub fn new(config: &SafetyConfig) -> Result<Self> {
        let groups = [
            (Intent::SelfDiagnosis, SELF_DIAGNOSIS),
            (Intent::Prescribing, PRESCRIBING),
            (Intent::PersonalTreatment, PERSONAL_TREATMENT),
        ];

        let mut intents = Vec::new();
        for (intent, patterns) in groups {
            for pattern in patterns {
                intents.push(IntentPattern {
                    intent,
                    regex: compile(pattern)?,
                });
            }
        }

        let medical_terms = MEDICAL_TERMS
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            intents,
            first_person: compile(FIRST_PERSON)?,
            clinical_action: compile(CLINICAL_ACTION)?,
            medical_terms,
            policy: config.medical_term_policy,
            require_evidence: config.require_evidence,
            min_evidence_confidence: config.min_evidence_confidence,
        })
    }

    pub fn policy(&self) -> MedicalTermPolicy {
        self.policy
    }

    /// Evaluate `query` against every layer, given the retrieved passages
    pub fn evaluate(&self, query: &str, passages: &[ScoredPassage]) -> GateDecision {
        if let Some(found) = self.intents.iter().find(|p| p.regex.is_match(query)) {
            return GateDecision::Deny(DenyReason::PersonalIntent(found.intent));
        }

        if self.first_person.is_match(query) && self.clinical_action.is_match(query) {
            return GateDecision::Deny(DenyReason::ClinicalSelfReference);
        }

        for regex in &self.medical_terms {
            if let Some(found) = regex.find(query) {
                let term = found.as_str().to_lowercase();
                match self.policy {
                    MedicalTermPolicy::Deny => {
                        return GateDecision::Deny(DenyReason::MedicalTerm(term));
                    }
                    MedicalTermPolicy::AllowWithAudit => {
                        tracing::warn!(
                            target: AUDIT_TARGET,
                            term = %term,
                            "Medical term in query allowed by policy"
                        );
                    }
                }
            }
        }

        if self.require_evidence
            && !passages
                .iter()
                .any(|p| p.confidence() >= self.min_evidence_confidence)
        {
            return GateDecision::Deny(DenyReason::NoEvidence);
        }

        GateDecision::Allow
    }

    pub fn is_safe(&self, query: &str, passages: &[ScoredPassage]) -> bool {
        self.evaluate(query, passages).is_allowed()
    }
}
