//! Sequence-level pruning of probe-pair candidates before any alignment search.
//!
//! Stages run in a fixed order and a candidate leaves the cascade at the first
//! stage it fails, so later metrics are never computed for it.

use crate::{
    candidate::{CandidateId, CandidatePool, ProbePairCandidate},
    error::{ProberError, Result},
    thermo::ThermoConditions,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Sequences that must not occur inside a binding region.
    pub mask_sequences: Vec<String>,
    /// Longest tolerated single-base run. `None` disables the stage.
    pub max_homopolymer: Option<usize>,
    /// Overall GC percent bounds, off unless set.
    pub min_gc: Option<f64>,
    pub max_gc: Option<f64>,
    /// Largest tolerated GC percent difference between the two arms.
    pub max_gc_diff: Option<f64>,
    /// Arm Tm bounds in C, off unless set.
    pub min_tm: Option<f64>,
    pub max_tm: Option<f64>,
    pub thermo: ThermoConditions,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mask_sequences: vec![],
            max_homopolymer: Some(4),
            min_gc: None,
            max_gc: None,
            max_gc_diff: Some(15.0),
            min_tm: None,
            max_tm: None,
            thermo: ThermoConditions::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("GC", self.min_gc, self.max_gc)?;
        check_range("Tm", self.min_tm, self.max_tm)?;
        if let Some(diff) = self.max_gc_diff
            && diff < 0.0
        {
            return Err(ProberError::invalid_config(format!(
                "max_gc_diff must not be negative, got {diff}"
            )));
        }
        if self.mask_sequences.iter().any(|m| m.trim().is_empty()) {
            return Err(ProberError::invalid_config("Mask sequences must not be empty"));
        }
        Ok(())
    }

    fn gc_enabled(&self) -> bool {
        self.min_gc.is_some() || self.max_gc.is_some()
    }

    fn tm_enabled(&self) -> bool {
        self.min_tm.is_some() || self.max_tm.is_some()
    }
}

fn check_range(what: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(ProberError::invalid_config(format!(
            "{what} range is empty: min {min} > max {max}"
        )));
    }
    Ok(())
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStage {
    Mask,
    Homopolymer,
    GcContent,
    GcBalance,
    MeltingTemp,
}

impl FilterStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mask => "Masked sequence",
            Self::Homopolymer => "Homopolymer",
            Self::GcContent => "GC content",
            Self::GcBalance => "GC balance",
            Self::MeltingTemp => "Melting temperature",
        }
    }
}

/// Survivor counts through the cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterFunnel {
    pub input: usize,
    pub rejected_mask: usize,
    pub rejected_homopolymer: usize,
    pub rejected_gc_content: usize,
    pub rejected_gc_balance: usize,
    pub rejected_tm: usize,
    pub passed: usize,
}

impl FilterFunnel {
    fn reject(&mut self, stage: FilterStage) {
        match stage {
            FilterStage::Mask => self.rejected_mask += 1,
            FilterStage::Homopolymer => self.rejected_homopolymer += 1,
            FilterStage::GcContent => self.rejected_gc_content += 1,
            FilterStage::GcBalance => self.rejected_gc_balance += 1,
            FilterStage::MeltingTemp => self.rejected_tm += 1,
        }
    }

    /// `(stage, survivors after it)` in cascade order.
    pub fn stages(&self) -> Vec<(FilterStage, usize)> {
        let mut left = self.input;
        [
            (FilterStage::Mask, self.rejected_mask),
            (FilterStage::Homopolymer, self.rejected_homopolymer),
            (FilterStage::GcContent, self.rejected_gc_content),
            (FilterStage::GcBalance, self.rejected_gc_balance),
            (FilterStage::MeltingTemp, self.rejected_tm),
        ]
        .into_iter()
        .map(|(stage, rejected)| {
            left -= rejected;
            (stage, left)
        })
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SequenceFilter {
    config: FilterConfig,
    masks: Vec<Vec<u8>>,
}

impl SequenceFilter {
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let masks = config
            .mask_sequences
            .iter()
            .map(|m| m.trim().to_ascii_uppercase().into_bytes())
            .collect();
        Ok(Self { config, masks })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// First failing stage, or `None` when the candidate passes.
    pub fn check(&self, candidate: &ProbePairCandidate) -> Option<FilterStage> {
        let cfg = &self.config;

        if self
            .masks
            .iter()
            .any(|mask| contains(candidate.region(), mask))
        {
            return Some(FilterStage::Mask);
        }

        if let Some(max) = cfg.max_homopolymer
            && candidate.max_homopolymer() > max
        {
            return Some(FilterStage::Homopolymer);
        }

        if cfg.gc_enabled() && !within(candidate.gc_overall(), cfg.min_gc, cfg.max_gc) {
            return Some(FilterStage::GcContent);
        }

        if let Some(max_diff) = cfg.max_gc_diff
            && (candidate.gc_left() - candidate.gc_right()).abs() > max_diff
        {
            return Some(FilterStage::GcBalance);
        }

        if cfg.tm_enabled() {
            let tm_ok = |tm: Option<f64>| tm.is_some_and(|tm| within(tm, cfg.min_tm, cfg.max_tm));
            let (left, right) = candidate.arm_tms(&cfg.thermo);
            if !tm_ok(left) || !tm_ok(right) {
                return Some(FilterStage::MeltingTemp);
            }
        }

        None
    }

    /// Runs the cascade over `ids`, returning the survivors in input order.
    pub fn apply(&self, pool: &CandidatePool, ids: &[CandidateId]) -> (Vec<CandidateId>, FilterFunnel) {
        let mut funnel = FilterFunnel {
            input: ids.len(),
            ..Default::default()
        };
        let mut survivors = Vec::with_capacity(ids.len());
        for candidate in pool.select(ids) {
            match self.check(candidate) {
                Some(stage) => funnel.reject(stage),
                None => survivors.push(candidate.id()),
            }
        }
        funnel.passed = survivors.len();
        (survivors, funnel)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        candidate::{CandidateGenerator, PairGeometry},
        sequence::{reverse_complement, Transcript},
    };

    /// Pool with exactly one candidate whose antisense region is `region`.
    fn single(region: &[u8]) -> CandidatePool {
        let sense = reverse_complement(region);
        let t = Transcript::new("t", &sense).unwrap();
        let geometry = PairGeometry {
            arm_len: (region.len() - 2) / 2,
            spacer_len: 2,
        };
        CandidateGenerator::new(0, geometry).unwrap().pool(&t)
    }

    fn only_homopolymer(max: usize) -> SequenceFilter {
        SequenceFilter::new(FilterConfig {
            max_homopolymer: Some(max),
            max_gc_diff: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_homopolymer_boundary() {
        // run of exactly 4 is kept, 5 is rejected
        let kept = single(b"ACGTAAAACGTACGTACGTA");
        let rejected = single(b"ACGTAAAAACGTACGTACGT");
        let filter = only_homopolymer(4);
        assert_eq!(filter.check(kept.get(0).unwrap()), None);
        assert_eq!(
            filter.check(rejected.get(0).unwrap()),
            Some(FilterStage::Homopolymer)
        );
    }

    #[test]
    fn test_gc_balance() {
        // left arm 100% GC, right arm 0% GC
        let pool = single(b"GCGCGCGCGCAAATATATATAT");
        let filter = SequenceFilter::new(FilterConfig {
            max_homopolymer: None,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.check(pool.get(0).unwrap()), Some(FilterStage::GcBalance));
        let lenient = SequenceFilter::new(FilterConfig {
            max_homopolymer: None,
            max_gc_diff: Some(100.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lenient.check(pool.get(0).unwrap()), None);
    }

    #[test]
    fn test_gc_content_optional() {
        let pool = single(b"ACGTACGTACGTACGTACGTAC");
        let candidate = pool.get(0).unwrap();
        let off = SequenceFilter::new(FilterConfig::default()).unwrap();
        assert_eq!(off.check(candidate), None);
        let strict = SequenceFilter::new(FilterConfig {
            min_gc: Some(60.0),
            max_gc: Some(80.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(strict.check(candidate), Some(FilterStage::GcContent));
    }

    #[test]
    fn test_tm_stage_is_lazy() {
        let pool = single(b"ACGTAAAAACGTACGTACGT");
        let filter = SequenceFilter::new(FilterConfig {
            min_tm: Some(0.0),
            max_tm: Some(100.0),
            ..Default::default()
        })
        .unwrap();
        let candidate = pool.get(0).unwrap();
        assert_eq!(filter.check(candidate), Some(FilterStage::Homopolymer));
        assert!(candidate.cached_tms().is_none());
    }

    #[test]
    fn test_tm_bounds() {
        let pool = single(b"ACGTACGTACGTACGTACGTACGTAGGACGTACGTACGTACGTACGTACGTA");
        let candidate = pool.get(0).unwrap();
        let hot = SequenceFilter::new(FilterConfig {
            min_tm: Some(70.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(hot.check(candidate), Some(FilterStage::MeltingTemp));
    }

    #[test]
    fn test_mask_and_funnel() {
        let t = Transcript::new("t", &b"ACGGTCATTGCA".repeat(20)).unwrap();
        let pool = CandidateGenerator::new(
            0,
            PairGeometry {
                arm_len: 5,
                spacer_len: 2,
            },
        )
        .unwrap()
        .pool(&t);
        let filter = SequenceFilter::new(FilterConfig {
            mask_sequences: vec!["tgcaatg".to_string()],
            max_gc_diff: None,
            ..Default::default()
        })
        .unwrap();
        let (survivors, funnel) = filter.apply(&pool, &pool.ids());
        assert_eq!(funnel.input, pool.len());
        assert!(funnel.rejected_mask > 0);
        assert_eq!(funnel.passed, survivors.len());
        assert_eq!(funnel.input - funnel.rejected_mask, funnel.passed);
        assert_eq!(funnel.stages().last().unwrap().1, funnel.passed);
        assert!(survivors.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_ranges() {
        let err = SequenceFilter::new(FilterConfig {
            min_tm: Some(70.0),
            max_tm: Some(50.0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.message.contains("Tm"));
    }
}
