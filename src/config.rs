use crate::{
    candidate::{CandidateGenerator, PairGeometry},
    classify::{HitThresholds, SelectionStrategy},
    error::{ProberError, Result},
    filter::{FilterConfig, SequenceFilter},
    isoform::IsoformPartitioner,
    pipeline::DesignPipeline,
    sequence::read_fasta_records,
    spacing::SpacingSelector,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_PATH: &str = "hcr-prober.json";

/// Every knob of a design run. Missing keys in a config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    pub skip_5prime: usize,
    pub arm_len: usize,
    pub spacer_len: usize,
    pub filter: FilterConfig,
    /// FASTA of sequences to exclude, appended to `filter.mask_sequences`.
    pub mask_fasta: Option<PathBuf>,
    pub thresholds: HitThresholds,
    pub strategy: String,
    pub target_id: Option<String>,
    pub common_strategy: String,
    pub unique_strategy: String,
    pub min_probe_distance: usize,
    pub max_probes: usize,
    pub delimiter: String,
    pub blast_ref: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub blast_extra_args: Vec<String>,
    pub output_dir: PathBuf,
    pub pool_name: Option<String>,
    /// JSON file or directory of JSON files; built-in set when unset.
    pub amplifiers: Option<PathBuf>,
    pub threads: Option<usize>,
}

impl Default for DesignConfig {
    fn default() -> Self {
        let geometry = PairGeometry::default();
        Self {
            skip_5prime: 100,
            arm_len: geometry.arm_len,
            spacer_len: geometry.spacer_len,
            filter: FilterConfig::default(),
            mask_fasta: None,
            thresholds: HitThresholds::default(),
            strategy: "any-strong-hit".to_string(),
            target_id: None,
            common_strategy: "any-strong-hit".to_string(),
            unique_strategy: "best-coverage".to_string(),
            min_probe_distance: 0,
            max_probes: 33,
            delimiter: "_".to_string(),
            blast_ref: None,
            db_path: None,
            blast_extra_args: vec![],
            output_dir: PathBuf::from("hcr_prober_output"),
            pool_name: None,
            amplifiers: None,
            threads: None,
        }
    }
}

impl DesignConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ProberError::not_found(format!("Could not read config '{}': {e}", path.display()))
        })?;
        serde_json::from_str::<Self>(&text).map_err(|e| {
            ProberError::invalid_config(format!("Could not parse config '{}': {e}", path.display()))
        })
    }

    /// `path` if given, else `hcr-prober.json` in the working directory if it
    /// exists, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::from_json_file(path)
            }
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                info!("Loading config from {DEFAULT_CONFIG_PATH}");
                Self::from_json_file(Path::new(DEFAULT_CONFIG_PATH))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn geometry(&self) -> PairGeometry {
        PairGeometry {
            arm_len: self.arm_len,
            spacer_len: self.spacer_len,
        }
    }

    pub fn selection_strategy(&self) -> Result<SelectionStrategy> {
        SelectionStrategy::parse(&self.strategy, self.target_id.as_deref())
    }

    pub fn common_selection_strategy(&self) -> Result<SelectionStrategy> {
        SelectionStrategy::parse(&self.common_strategy, self.target_id.as_deref())
    }

    /// A targeted unique strategy is aimed at each isoform at run time.
    pub fn unique_selection_strategy(&self) -> Result<SelectionStrategy> {
        match self.unique_strategy.trim() {
            "specific-id" | "specific-transcript" => Ok(SelectionStrategy::SpecificId {
                target: String::new(),
            }),
            name => SelectionStrategy::parse(name, None),
        }
    }

    /// Checks everything that can be checked without running a unit.
    pub fn validate(&self) -> Result<()> {
        if self.arm_len == 0 {
            return Err(ProberError::invalid_config("Arm length must be positive"));
        }
        if self.max_probes == 0 {
            return Err(ProberError::invalid_config("max_probes must be at least 1"));
        }
        if self.delimiter.is_empty() {
            return Err(ProberError::invalid_config("Gene prefix delimiter is empty"));
        }
        let t = &self.thresholds;
        if !t.min_bitscore.is_finite() || t.min_bitscore < 0.0 {
            return Err(ProberError::invalid_config(format!(
                "min_bitscore must be a non-negative number, got {}",
                t.min_bitscore
            )));
        }
        if t.max_evalue.is_nan() || t.max_evalue < 0.0 {
            return Err(ProberError::invalid_config(format!(
                "max_evalue must be a non-negative number, got {}",
                t.max_evalue
            )));
        }
        self.filter.validate()?;
        self.selection_strategy()?;
        self.common_selection_strategy()?;
        self.unique_selection_strategy()?;
        if let Some(mask) = &self.mask_fasta
            && !mask.is_file()
        {
            return Err(ProberError::not_found(format!(
                "Mask FASTA '{}' does not exist",
                mask.display()
            )));
        }
        Ok(())
    }

    fn filter_config(&self) -> Result<FilterConfig> {
        let mut filter = self.filter.clone();
        if let Some(path) = &self.mask_fasta {
            let masks = read_fasta_records(path)?;
            info!("Loaded {} mask sequence(s) from {}", masks.len(), path.display());
            filter.mask_sequences.extend(
                masks
                    .into_iter()
                    .map(|(_, seq)| String::from_utf8_lossy(&seq).to_string())
                    .filter(|s| !s.trim().is_empty()),
            );
        }
        Ok(filter)
    }

    pub fn pipeline(&self) -> Result<DesignPipeline> {
        self.validate()?;
        Ok(DesignPipeline {
            generator: CandidateGenerator::new(self.skip_5prime, self.geometry())?,
            filter: SequenceFilter::new(self.filter_config()?)?,
            thresholds: self.thresholds,
            spacing: SpacingSelector::new(self.min_probe_distance),
            max_probes: self.max_probes,
        })
    }

    pub fn partitioner(&self) -> Result<IsoformPartitioner> {
        Ok(IsoformPartitioner {
            pipeline: self.pipeline()?,
            common_strategy: self.common_selection_strategy()?,
            unique_strategy: self.unique_selection_strategy()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DesignConfig::default();
        assert_eq!(config.skip_5prime, 100);
        assert_eq!(config.geometry().pair_len(), 52);
        assert_eq!(config.max_probes, 33);
        assert_eq!(config.filter.max_homopolymer, Some(4));
        assert_eq!(config.selection_strategy().unwrap(), SelectionStrategy::AnyStrongHit);
        assert_eq!(
            config.unique_selection_strategy().unwrap(),
            SelectionStrategy::BestCoverage
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_probes": 20, "filter": {{"min_tm": 45.0}}, "thresholds": {{"min_bitscore": 60}}, "strategy": "best-coverage"}}"#
        )
        .unwrap();
        let config = DesignConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_probes, 20);
        assert_eq!(config.filter.min_tm, Some(45.0));
        assert_eq!(config.filter.max_gc_diff, Some(15.0));
        assert_eq!(config.thresholds.min_bitscore, 60.0);
        assert_eq!(config.thresholds.max_evalue, 1e-10);
        assert_eq!(config.skip_5prime, 100);
        assert_eq!(config.selection_strategy().unwrap(), SelectionStrategy::BestCoverage);
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = DesignConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_missing_file() {
        let err = DesignConfig::load(Some(Path::new("/nonexistent/hcr.json"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_validation_fails_fast() {
        let mut config = DesignConfig {
            strategy: "specific-id".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::InvalidConfig);
        config.target_id = Some("ENST0001".to_string());
        assert!(config.validate().is_ok());

        let bad = DesignConfig {
            arm_len: 0,
            ..Default::default()
        };
        assert!(bad.pipeline().is_err());

        let mut bad = DesignConfig::default();
        bad.filter.min_gc = Some(60.0);
        bad.filter.max_gc = Some(40.0);
        assert!(bad.validate().is_err());

        let mut bad = DesignConfig::default();
        bad.thresholds.max_evalue = -1.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_mask_fasta_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".fa").tempfile().unwrap();
        writeln!(file, ">repeat\nacgtacgt").unwrap();
        let config = DesignConfig {
            mask_fasta: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let pipeline = config.pipeline().unwrap();
        assert_eq!(pipeline.filter.config().mask_sequences, vec!["acgtacgt".to_string()]);
    }

    #[test]
    fn test_partitioner_strategies() {
        let config = DesignConfig {
            unique_strategy: "specific-id".to_string(),
            ..Default::default()
        };
        let p = config.partitioner().unwrap();
        assert_eq!(p.common_strategy, SelectionStrategy::AnyStrongHit);
        assert!(matches!(p.unique_strategy, SelectionStrategy::SpecificId { .. }));
    }
}
