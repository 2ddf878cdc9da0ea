//! Common and isoform-specific probe design for transcripts sharing a gene prefix.
//!
//! A binding region counts as present on an isoform when the identical
//! pair-length sequence occurs anywhere on that isoform's antisense strand.
//! The longest isoform is the reference for the common pool; each isoform gets
//! its own unique pool. Regions shared by some but not all siblings belong to
//! neither and are only counted.

use crate::{
    align::{Aligner, ReferenceSet},
    candidate::{CandidateId, CandidatePool},
    classify::SelectionStrategy,
    error::{ProberError, Result},
    filter::FilterFunnel,
    pipeline::{DesignOutcome, DesignPipeline, Specificity, StageFunnel},
    sequence::{Transcript, TranscriptId},
};
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoformGroup {
    pub gene: String,
    /// Ordered by id.
    pub isoforms: Vec<Transcript>,
}

impl IsoformGroup {
    /// Longest isoform, ties broken by smallest id.
    pub fn reference(&self) -> Option<&Transcript> {
        self.isoforms
            .iter()
            .min_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.id().cmp(b.id())))
    }
}

/// Groups transcripts by the id text before the first `delimiter`.
pub fn group_by_prefix(transcripts: Vec<Transcript>, delimiter: &str) -> BTreeMap<String, IsoformGroup> {
    let groups: BTreeMap<String, IsoformGroup> = transcripts
        .into_iter()
        .into_group_map_by(|t| t.gene_prefix(delimiter).to_string())
        .into_iter()
        .map(|(gene, mut isoforms)| {
            isoforms.sort_by(|a, b| a.id().cmp(b.id()));
            (gene.clone(), IsoformGroup { gene, isoforms })
        })
        .collect();
    info!(
        "Identified {} gene group(s): {}",
        groups.len(),
        groups.keys().join(", ")
    );
    groups
}

/// Every `width`-long window of an isoform's antisense strand.
fn antisense_windows(transcript: &Transcript, width: usize) -> HashSet<Vec<u8>> {
    let antisense = transcript.antisense();
    if antisense.len() < width || width == 0 {
        return HashSet::new();
    }
    antisense.windows(width).map(<[u8]>::to_vec).collect()
}

/// Index sets produced by partitioning, before any classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoformPartition {
    pub reference_id: TranscriptId,
    /// Candidate ids on the reference isoform present on every sibling.
    pub common: Vec<CandidateId>,
    /// Per isoform, candidate ids present on no sibling.
    pub unique: BTreeMap<TranscriptId, Vec<CandidateId>>,
    /// Per isoform, filtered candidates present on some but not all siblings.
    pub partially_shared: BTreeMap<TranscriptId, usize>,
}

/// One isoform's generated and filtered candidates.
pub struct IsoformCandidates<'a> {
    pub transcript: &'a Transcript,
    pub pool: CandidatePool,
    pub filtered: Vec<CandidateId>,
    pub funnel: FilterFunnel,
}

/// Splits filtered candidates of every isoform into common and unique sets.
/// `reference` indexes into `isoforms`.
pub fn partition(isoforms: &[IsoformCandidates], reference: usize, pair_len: usize) -> IsoformPartition {
    let mut ret = IsoformPartition {
        reference_id: isoforms
            .get(reference)
            .map(|i| i.transcript.id().to_string())
            .unwrap_or_default(),
        ..Default::default()
    };

    if isoforms.len() < 2 {
        if let Some(only) = isoforms.get(reference) {
            ret.common = only.filtered.clone();
            ret.unique.insert(only.transcript.id().to_string(), vec![]);
        }
        return ret;
    }

    let windows: Vec<HashSet<Vec<u8>>> = isoforms
        .iter()
        .map(|i| antisense_windows(i.transcript, pair_len))
        .collect();

    for (idx, iso) in isoforms.iter().enumerate() {
        let siblings = isoforms.len() - 1;
        let mut unique = vec![];
        let mut partial = 0;
        for candidate in iso.pool.select(&iso.filtered) {
            let present = windows
                .iter()
                .enumerate()
                .filter(|(other, set)| *other != idx && set.contains(candidate.region()))
                .count();
            if present == 0 {
                unique.push(candidate.id());
            } else if present == siblings {
                if idx == reference {
                    ret.common.push(candidate.id());
                }
            } else {
                partial += 1;
            }
        }
        let id = iso.transcript.id().to_string();
        ret.unique.insert(id.clone(), unique);
        ret.partially_shared.insert(id, partial);
    }
    ret
}

/// Reference for one isoform's unique pool: the configured reference plus its
/// siblings as extra subjects. The isoform itself is only added when there is
/// no database. An empty reference stays empty so the screen is skipped.
fn unique_reference(reference: &ReferenceSet, group: &IsoformGroup, isoform: &str) -> ReferenceSet {
    if reference.is_empty() {
        return reference.clone();
    }
    let include_self = reference.database.is_none();
    reference.clone().with_extra_subjects(
        group
            .isoforms
            .iter()
            .filter(|t| include_self || t.id() != isoform)
            .map(|t| (t.id().to_string(), t.sequence().to_vec()))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsoformOutcome {
    pub gene: String,
    pub partition: IsoformPartition,
    pub common: DesignOutcome,
    /// One outcome per isoform, ordered by isoform id.
    pub unique: Vec<DesignOutcome>,
}

pub struct IsoformPartitioner {
    pub pipeline: DesignPipeline,
    pub common_strategy: SelectionStrategy,
    /// A `SpecificId` strategy is retargeted at each isoform in turn.
    pub unique_strategy: SelectionStrategy,
}

impl IsoformPartitioner {
    fn unique_strategy_for(&self, isoform: &str) -> SelectionStrategy {
        match &self.unique_strategy {
            SelectionStrategy::SpecificId { .. } => SelectionStrategy::SpecificId {
                target: isoform.to_string(),
            },
            other => other.clone(),
        }
    }

    pub fn run(
        &self,
        group: &IsoformGroup,
        aligner: Option<&dyn Aligner>,
        reference: &ReferenceSet,
    ) -> Result<IsoformOutcome> {
        let ref_transcript = group.reference().ok_or_else(|| {
            ProberError::invalid_input(format!("Gene group '{}' has no isoforms", group.gene))
        })?;
        let ref_idx = group
            .isoforms
            .iter()
            .position(|t| t.id() == ref_transcript.id())
            .unwrap_or_default();
        if group.isoforms.len() < 2 {
            warn!(
                "Gene group '{}' has only one sequence, treating all of it as common",
                group.gene
            );
        } else {
            info!(
                "Using '{}' ({} nt) as reference isoform for '{}'",
                ref_transcript.id(),
                ref_transcript.len(),
                group.gene
            );
        }

        let candidates: Vec<IsoformCandidates> = group
            .isoforms
            .iter()
            .map(|transcript| {
                let pool = self.pipeline.candidates(transcript);
                let (filtered, funnel) = self.pipeline.filtered(&pool);
                IsoformCandidates {
                    transcript,
                    pool,
                    filtered,
                    funnel,
                }
            })
            .collect();

        let parts = partition(&candidates, ref_idx, self.pipeline.generator.geometry.pair_len());
        info!(
            "'{}': {} common candidate(s), {} partially shared dropped",
            group.gene,
            parts.common.len(),
            parts.partially_shared.values().sum::<usize>()
        );

        let funnel = |iso: &IsoformCandidates, kept: usize| StageFunnel {
            raw: iso.pool.len(),
            filter: iso.funnel.clone(),
            post_filter: iso.filtered.len(),
            post_partition: Some(kept),
            ..Default::default()
        };

        let reference_iso = &candidates[ref_idx];
        let common = self.pipeline.select(
            reference_iso.transcript,
            &reference_iso.pool,
            &parts.common,
            funnel(reference_iso, parts.common.len()),
            aligner.map(|aligner| Specificity {
                aligner,
                reference,
                strategy: &self.common_strategy,
            }),
        )?;

        let mut unique = Vec::with_capacity(candidates.len());
        for iso in &candidates {
            let ids = parts
                .unique
                .get(iso.transcript.id())
                .cloned()
                .unwrap_or_default();
            let strategy = self.unique_strategy_for(iso.transcript.id());
            let iso_reference = unique_reference(reference, group, iso.transcript.id());
            unique.push(self.pipeline.select(
                iso.transcript,
                &iso.pool,
                &ids,
                funnel(iso, ids.len()),
                aligner.map(|aligner| Specificity {
                    aligner,
                    reference: &iso_reference,
                    strategy: &strategy,
                }),
            )?);
        }

        Ok(IsoformOutcome {
            gene: group.gene.clone(),
            partition: parts,
            common,
            unique,
        })
    }
}
