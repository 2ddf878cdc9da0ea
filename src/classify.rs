//! Specificity classification of filtered candidates from alignment hits.

use crate::{
    candidate::CandidateId,
    error::{ProberError, Result},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// One alignment of a candidate's binding region against a reference subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitRecord {
    pub candidate: CandidateId,
    pub subject_id: String,
    pub bitscore: f64,
    pub evalue: f64,
    /// Fraction of the query covered by the alignment, 0 to 1.
    pub coverage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitThresholds {
    pub min_bitscore: f64,
    pub max_evalue: f64,
}

impl Default for HitThresholds {
    fn default() -> Self {
        Self {
            min_bitscore: 75.0,
            max_evalue: 1e-10,
        }
    }
}

impl HitThresholds {
    pub fn is_strong(&self, hit: &HitRecord) -> bool {
        hit.bitscore >= self.min_bitscore && hit.evalue <= self.max_evalue
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum SelectionStrategy {
    AnyStrongHit,
    BestCoverage,
    SpecificId { target: String },
}

impl SelectionStrategy {
    /// Parses a strategy name. `specific-id` requires `target`.
    pub fn parse(name: &str, target: Option<&str>) -> Result<Self> {
        match name.trim() {
            "any-strong-hit" => Ok(Self::AnyStrongHit),
            "best-coverage" | "most-likely-transcript" => Ok(Self::BestCoverage),
            "specific-id" | "specific-transcript" => match target.map(str::trim) {
                Some(t) if !t.is_empty() => Ok(Self::SpecificId {
                    target: t.to_string(),
                }),
                _ => Err(ProberError::invalid_config(format!(
                    "Strategy '{name}' requires a target transcript id"
                ))),
            },
            other => Err(ProberError::invalid_config(format!(
                "Unknown selection strategy '{other}', expected any-strong-hit, best-coverage or specific-id"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AnyStrongHit => "any-strong-hit",
            Self::BestCoverage => "best-coverage",
            Self::SpecificId { .. } => "specific-id",
        }
    }

    /// Global pre-pass. Only `best-coverage` needs one.
    pub fn prepare(&self, index: &StrongHitIndex) -> ClassificationContext {
        match self {
            Self::BestCoverage => ClassificationContext {
                best_subject: index.best_covered_subject(),
            },
            _ => ClassificationContext::default(),
        }
    }

    /// Per-candidate acceptance given the candidate's strong subjects.
    pub fn accepts(&self, ctx: &ClassificationContext, subjects: &BTreeSet<String>) -> bool {
        match self {
            Self::AnyStrongHit => !subjects.is_empty(),
            Self::SpecificId { target } => subjects.len() == 1 && subjects.contains(target),
            Self::BestCoverage => match &ctx.best_subject {
                Some(best) => subjects.len() == 1 && subjects.contains(&best.subject_id),
                None => false,
            },
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpecificId { target } => write!(f, "specific-id ({target})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Subject chosen by the `best-coverage` pre-pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub subject_id: String,
    /// Candidates whose only strong subject is this one.
    pub coverage: usize,
    /// Mean of those candidates' best bitscore against it.
    pub mean_bitscore: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationContext {
    pub best_subject: Option<SubjectScore>,
}

/// Strong hits grouped per candidate: subject id to best bitscore.
///
/// Several HSPs of one candidate against the same subject collapse into one
/// entry, so "a unique strong hit" means exactly one distinct strong subject.
#[derive(Debug, Clone, Default)]
pub struct StrongHitIndex {
    by_candidate: BTreeMap<CandidateId, BTreeMap<String, f64>>,
}

impl StrongHitIndex {
    pub fn build(hits: &[HitRecord], thresholds: &HitThresholds, ids: &[CandidateId]) -> Self {
        let wanted: BTreeSet<CandidateId> = ids.iter().copied().collect();
        let mut by_candidate: BTreeMap<CandidateId, BTreeMap<String, f64>> = BTreeMap::new();
        for hit in hits
            .iter()
            .filter(|h| wanted.contains(&h.candidate) && thresholds.is_strong(h))
        {
            let best = by_candidate
                .entry(hit.candidate)
                .or_default()
                .entry(hit.subject_id.clone())
                .or_insert(f64::NEG_INFINITY);
            *best = best.max(hit.bitscore);
        }
        Self { by_candidate }
    }

    pub fn subjects(&self, id: CandidateId) -> BTreeSet<String> {
        self.by_candidate
            .get(&id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_strong_hit(&self, id: CandidateId) -> bool {
        self.by_candidate.contains_key(&id)
    }

    /// Highest coverage, then higher mean bitscore, then smallest id.
    pub fn best_covered_subject(&self) -> Option<SubjectScore> {
        let mut per_subject: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for subjects in self.by_candidate.values() {
            if subjects.len() != 1 {
                continue;
            }
            if let Some((subject, bitscore)) = subjects.iter().next() {
                let entry = per_subject.entry(subject.as_str()).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += bitscore;
            }
        }

        per_subject
            .into_iter()
            .map(|(subject, (coverage, total))| SubjectScore {
                subject_id: subject.to_string(),
                coverage,
                mean_bitscore: total / coverage as f64,
            })
            .min_by(|a, b| {
                b.coverage
                    .cmp(&a.coverage)
                    .then_with(|| b.mean_bitscore.total_cmp(&a.mean_bitscore))
                    .then_with(|| a.subject_id.cmp(&b.subject_id))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Accepted candidate ids, in input order.
    pub accepted: Vec<CandidateId>,
    pub best_subject: Option<SubjectScore>,
    /// Every strong hit of the classified candidates, for reporting.
    pub strong_hits: Vec<HitRecord>,
}

pub struct SpecificityClassifier {
    pub strategy: SelectionStrategy,
    pub thresholds: HitThresholds,
}

impl SpecificityClassifier {
    pub fn new(strategy: SelectionStrategy, thresholds: HitThresholds) -> Self {
        Self {
            strategy,
            thresholds,
        }
    }

    /// Classifies `ids` against `hits`. A pure function of its inputs.
    pub fn classify(&self, ids: &[CandidateId], hits: &[HitRecord]) -> Classification {
        let index = StrongHitIndex::build(hits, &self.thresholds, ids);
        let ctx = self.strategy.prepare(&index);
        let accepted = ids
            .iter()
            .copied()
            .filter(|id| self.strategy.accepts(&ctx, &index.subjects(*id)))
            .collect();

        let wanted: BTreeSet<CandidateId> = ids.iter().copied().collect();
        let mut strong_hits: Vec<HitRecord> = hits
            .iter()
            .filter(|h| wanted.contains(&h.candidate) && self.thresholds.is_strong(h))
            .cloned()
            .collect();
        strong_hits.sort_by(|a, b| {
            a.candidate
                .cmp(&b.candidate)
                .then_with(|| b.bitscore.total_cmp(&a.bitscore))
                .then_with(|| a.subject_id.cmp(&b.subject_id))
        });

        Classification {
            accepted,
            best_subject: ctx.best_subject,
            strong_hits,
        }
    }
}
