//! The single-transcript chain: generate, filter, classify, space, subsample.

use crate::{
    align::{build_queries, Aligner, ReferenceSet},
    candidate::{CandidateGenerator, CandidateId, CandidatePool, ProbePairCandidate},
    classify::{HitRecord, HitThresholds, SelectionStrategy, SpecificityClassifier, SubjectScore},
    error::Result,
    filter::{FilterFunnel, SequenceFilter},
    sequence::Transcript,
    spacing::SpacingSelector,
    subsample::subsample,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// What the specificity stage searches with and how it decides.
#[derive(Clone, Copy)]
pub struct Specificity<'a> {
    pub aligner: &'a dyn Aligner,
    pub reference: &'a ReferenceSet,
    pub strategy: &'a SelectionStrategy,
}

/// Survivor counts through the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFunnel {
    pub raw: usize,
    pub filter: FilterFunnel,
    pub post_filter: usize,
    /// Set when isoform partitioning narrowed the filtered set.
    pub post_partition: Option<usize>,
    /// `None` when no reference was searched.
    pub post_classification: Option<usize>,
    pub post_spacing: usize,
    pub selected: usize,
}

/// A chosen pair as reported to writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedProbe {
    pub candidate: CandidateId,
    /// 0-based start on the antisense strand.
    pub start: usize,
    /// 0-based start of the target region on the sense strand.
    pub sense_start: usize,
    pub left_arm: String,
    pub spacer: String,
    pub right_arm: String,
    pub gc_left: f64,
    pub gc_right: f64,
    pub tm_left: Option<f64>,
    pub tm_right: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignOutcome {
    pub transcript_id: String,
    pub transcript_len: usize,
    pub strategy: Option<String>,
    pub funnel: StageFunnel,
    /// Ordered by position.
    pub probes: Vec<SelectedProbe>,
    pub best_subject: Option<SubjectScore>,
    pub strong_hits: Vec<HitRecord>,
}

impl DesignOutcome {
    /// No probe survived; reported, not an error.
    pub fn is_failure(&self) -> bool {
        self.probes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DesignPipeline {
    pub generator: CandidateGenerator,
    pub filter: SequenceFilter,
    pub thresholds: HitThresholds,
    pub spacing: SpacingSelector,
    pub max_probes: usize,
}

impl DesignPipeline {
    pub fn candidates(&self, transcript: &Transcript) -> CandidatePool {
        self.generator.pool(transcript)
    }

    /// Sequence filtering over a whole pool.
    pub fn filtered(&self, pool: &CandidatePool) -> (Vec<CandidateId>, FilterFunnel) {
        self.filter.apply(pool, &pool.ids())
    }

    /// Runs every stage on one transcript.
    pub fn run(&self, transcript: &Transcript, specificity: Option<Specificity>) -> Result<DesignOutcome> {
        let pool = self.candidates(transcript);
        let (ids, filter_funnel) = self.filtered(&pool);
        info!(
            "({}) {} of {} candidate pairs passed sequence filters",
            transcript.id(),
            ids.len(),
            pool.len()
        );
        let funnel = StageFunnel {
            raw: pool.len(),
            post_filter: ids.len(),
            filter: filter_funnel,
            ..Default::default()
        };
        self.select(transcript, &pool, &ids, funnel, specificity)
    }

    /// Classification, spacing and subsampling over an already filtered id set.
    pub fn select(
        &self,
        transcript: &Transcript,
        pool: &CandidatePool,
        ids: &[CandidateId],
        mut funnel: StageFunnel,
        specificity: Option<Specificity>,
    ) -> Result<DesignOutcome> {
        let name = transcript.id();
        let mut best_subject = None;
        let mut strong_hits = vec![];
        let mut strategy = None;

        let specific: Vec<CandidateId> = match specificity {
            Some(screen) if !screen.reference.is_empty() => {
                let queries = build_queries(pool, ids);
                let hits = screen.aligner.search(&queries, screen.reference)?;
                let classifier = SpecificityClassifier::new(screen.strategy.clone(), self.thresholds);
                let classification = classifier.classify(ids, &hits);
                if let Some(best) = &classification.best_subject {
                    info!(
                        "({name}) best supported subject '{}' (coverage {}, mean bitscore {:.2})",
                        best.subject_id, best.coverage, best.mean_bitscore
                    );
                }
                info!(
                    "({name}) {} of {} pairs passed the '{}' screen",
                    classification.accepted.len(),
                    ids.len(),
                    screen.strategy
                );
                funnel.post_classification = Some(classification.accepted.len());
                best_subject = classification.best_subject;
                strong_hits = classification.strong_hits;
                strategy = Some(screen.strategy.to_string());
                classification.accepted
            }
            _ => {
                warn!("({name}) no reference configured, skipping specificity screen");
                ids.to_vec()
            }
        };

        let spaced = self.spacing.select(pool, &specific);
        funnel.post_spacing = spaced.len();
        if spaced.len() > self.max_probes {
            info!(
                "({name}) subsampling {} pairs to {} for even coverage",
                spaced.len(),
                self.max_probes
            );
        }
        let chosen = subsample(&spaced, self.max_probes);
        funnel.selected = chosen.len();
        if chosen.is_empty() {
            warn!("({name}) no probe pairs survived");
        }

        let thermo = &self.filter.config().thermo;
        let probes = pool
            .select(&chosen)
            .map(|c| selected_probe(c, thermo))
            .collect();

        Ok(DesignOutcome {
            transcript_id: name.to_string(),
            transcript_len: transcript.len(),
            strategy,
            funnel,
            probes,
            best_subject,
            strong_hits,
        })
    }
}

fn text(seq: &[u8]) -> String {
    String::from_utf8_lossy(seq).to_string()
}

fn selected_probe(c: &ProbePairCandidate, thermo: &crate::thermo::ThermoConditions) -> SelectedProbe {
    let (tm_left, tm_right) = c.arm_tms(thermo);
    SelectedProbe {
        candidate: c.id(),
        start: c.start(),
        sense_start: c.sense_start(),
        left_arm: text(c.left_arm()),
        spacer: text(c.spacer()),
        right_arm: text(c.right_arm()),
        gc_left: c.gc_left(),
        gc_right: c.gc_right(),
        tm_left,
        tm_right,
    }
}
