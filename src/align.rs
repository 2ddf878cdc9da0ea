//! Contract with the external alignment search.

use crate::{
    candidate::{CandidateId, CandidatePool},
    classify::HitRecord,
    error::Result,
};
use std::path::PathBuf;

/// One candidate's binding region, named by its candidate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentQuery {
    pub candidate: CandidateId,
    pub sequence: Vec<u8>,
}

impl AlignmentQuery {
    pub fn name(&self) -> String {
        query_name(self.candidate)
    }
}

pub fn query_name(candidate: CandidateId) -> String {
    format!("c{candidate}")
}

pub fn parse_query_name(name: &str) -> Option<CandidateId> {
    name.strip_prefix('c')?.parse().ok()
}

/// Builds one query per candidate id, in id order.
pub fn build_queries(pool: &CandidatePool, ids: &[CandidateId]) -> Vec<AlignmentQuery> {
    pool.select(ids)
        .map(|c| AlignmentQuery {
            candidate: c.id(),
            sequence: c.query_sequence(),
        })
        .collect()
}

/// What the queries are searched against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    /// Prefix of a prepared nucleotide database.
    pub database: Option<PathBuf>,
    /// Additional subjects searched alongside the database.
    pub extra_subjects: Vec<(String, Vec<u8>)>,
}

impl ReferenceSet {
    pub fn database(database: PathBuf) -> Self {
        Self {
            database: Some(database),
            extra_subjects: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_none() && self.extra_subjects.is_empty()
    }

    pub fn with_extra_subjects(mut self, subjects: Vec<(String, Vec<u8>)>) -> Self {
        self.extra_subjects.extend(subjects);
        self
    }
}

/// A batched alignment search. One call per unit of work.
pub trait Aligner: Sync {
    fn search(&self, queries: &[AlignmentQuery], reference: &ReferenceSet) -> Result<Vec<HitRecord>>;
}
