use crate::{
    error::{ProberError, Result},
    sequence::{gc_percent, max_homopolymer_run, Transcript, TranscriptId},
    thermo::{calc_tm, ThermoConditions},
};
use std::{ops::Range, sync::OnceLock};

/// Stable, position-derived index of a candidate inside its [`CandidatePool`].
pub type CandidateId = usize;

/// Window geometry shared by every candidate of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairGeometry {
    pub arm_len: usize,
    pub spacer_len: usize,
}

impl PairGeometry {
    pub fn pair_len(&self) -> usize {
        2 * self.arm_len + self.spacer_len
    }
}

impl Default for PairGeometry {
    fn default() -> Self {
        Self {
            arm_len: 25,
            spacer_len: 2,
        }
    }
}

/// One probe-pair binding site on the antisense strand.
///
/// Metrics are computed on first access and cached; the sequence data never
/// changes after generation.
#[derive(Debug)]
pub struct ProbePairCandidate {
    id: CandidateId,
    transcript_id: TranscriptId,
    start: usize,
    region: Vec<u8>,
    geometry: PairGeometry,
    transcript_len: usize,
    homopolymer: OnceLock<usize>,
    gc: OnceLock<(f64, f64, f64)>,
    tm: OnceLock<(Option<f64>, Option<f64>)>,
}

impl ProbePairCandidate {
    fn new(
        id: CandidateId,
        transcript_id: &str,
        start: usize,
        region: &[u8],
        geometry: PairGeometry,
        transcript_len: usize,
    ) -> Self {
        Self {
            id,
            transcript_id: transcript_id.to_string(),
            start,
            region: region.to_vec(),
            geometry,
            transcript_len,
            homopolymer: OnceLock::new(),
            gc: OnceLock::new(),
            tm: OnceLock::new(),
        }
    }

    #[inline(always)]
    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn transcript_id(&self) -> &str {
        &self.transcript_id
    }

    /// 0-based start on the antisense strand.
    #[inline(always)]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive end on the antisense strand.
    #[inline(always)]
    pub fn end(&self) -> usize {
        self.start + self.region.len()
    }

    pub fn span(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// 0-based start of the targeted region on the sense strand.
    pub fn sense_start(&self) -> usize {
        self.transcript_len - self.end()
    }

    /// Full binding region, arms and spacer.
    pub fn region(&self) -> &[u8] {
        &self.region
    }

    pub fn left_arm(&self) -> &[u8] {
        &self.region[..self.geometry.arm_len]
    }

    pub fn spacer(&self) -> &[u8] {
        &self.region[self.geometry.arm_len..self.geometry.arm_len + self.geometry.spacer_len]
    }

    pub fn right_arm(&self) -> &[u8] {
        &self.region[self.geometry.arm_len + self.geometry.spacer_len..]
    }

    /// Query used for the alignment search: both arms, spacer masked with `N`.
    pub fn query_sequence(&self) -> Vec<u8> {
        let mut ret = self.left_arm().to_vec();
        ret.extend(std::iter::repeat_n(b'N', self.geometry.spacer_len));
        ret.extend_from_slice(self.right_arm());
        ret
    }

    pub fn max_homopolymer(&self) -> usize {
        *self
            .homopolymer
            .get_or_init(|| max_homopolymer_run(&self.region))
    }

    fn gc(&self) -> (f64, f64, f64) {
        *self.gc.get_or_init(|| {
            (
                gc_percent(self.left_arm()),
                gc_percent(self.right_arm()),
                gc_percent(&self.region),
            )
        })
    }

    /// GC percent of the left arm.
    pub fn gc_left(&self) -> f64 {
        self.gc().0
    }

    /// GC percent of the right arm.
    pub fn gc_right(&self) -> f64 {
        self.gc().1
    }

    /// GC percent of the whole binding region.
    pub fn gc_overall(&self) -> f64 {
        self.gc().2
    }

    /// Arm melting temperatures `(left, right)`. The conditions are fixed for a
    /// run, so the first call's conditions are the ones cached.
    pub fn arm_tms(&self, conditions: &ThermoConditions) -> (Option<f64>, Option<f64>) {
        *self.tm.get_or_init(|| {
            (
                calc_tm(self.left_arm(), conditions),
                calc_tm(self.right_arm(), conditions),
            )
        })
    }

    /// Cached Tm values, if the Tm stage has evaluated this candidate.
    pub fn cached_tms(&self) -> Option<(Option<f64>, Option<f64>)> {
        self.tm.get().copied()
    }
}

/// Slides the pair window across a transcript's antisense strand.
#[derive(Debug, Clone, Copy)]
pub struct CandidateGenerator {
    pub skip_5prime: usize,
    pub geometry: PairGeometry,
}

impl CandidateGenerator {
    pub fn new(skip_5prime: usize, geometry: PairGeometry) -> Result<Self> {
        if geometry.arm_len == 0 {
            return Err(ProberError::invalid_config("Arm length must be positive"));
        }
        Ok(Self {
            skip_5prime,
            geometry,
        })
    }

    /// Lazy, position-ordered candidates. Calling this again restarts the scan.
    pub fn candidates<'a>(&self, transcript: &'a Transcript) -> Candidates<'a> {
        let antisense = transcript.antisense();
        let pair_len = self.geometry.pair_len();
        let last = antisense.len().checked_sub(pair_len);
        Candidates {
            transcript,
            antisense,
            geometry: self.geometry,
            skip: self.skip_5prime,
            next: self.skip_5prime,
            last,
        }
    }

    /// Materialises every candidate into an arena.
    pub fn pool(&self, transcript: &Transcript) -> CandidatePool {
        CandidatePool {
            transcript_id: transcript.id().to_string(),
            candidates: self.candidates(transcript).collect(),
        }
    }
}

pub struct Candidates<'a> {
    transcript: &'a Transcript,
    antisense: Vec<u8>,
    geometry: PairGeometry,
    skip: usize,
    next: usize,
    last: Option<usize>,
}

impl Iterator for Candidates<'_> {
    type Item = ProbePairCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        let last = self.last?;
        if self.next > last {
            return None;
        }
        let p = self.next;
        self.next += 1;
        let region = &self.antisense[p..p + self.geometry.pair_len()];
        Some(ProbePairCandidate::new(
            p - self.skip,
            self.transcript.id(),
            p,
            region,
            self.geometry,
            self.antisense.len(),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match self.last {
            Some(last) if self.next <= last => last - self.next + 1,
            _ => 0,
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Candidates<'_> {}

/// Arena of one transcript's candidates, indexed by [`CandidateId`].
#[derive(Debug, Default)]
pub struct CandidatePool {
    transcript_id: TranscriptId,
    candidates: Vec<ProbePairCandidate>,
}

impl CandidatePool {
    pub fn transcript_id(&self) -> &str {
        &self.transcript_id
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: CandidateId) -> Option<&ProbePairCandidate> {
        self.candidates.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbePairCandidate> {
        self.candidates.iter()
    }

    pub fn ids(&self) -> Vec<CandidateId> {
        (0..self.candidates.len()).collect()
    }

    /// Resolves an index set, silently skipping ids that are not in the pool.
    pub fn select<'a>(&'a self, ids: &'a [CandidateId]) -> impl Iterator<Item = &'a ProbePairCandidate> {
        ids.iter().filter_map(|id| self.get(*id))
    }
}
