//! HCR amplifier definitions and assembly of orderable oligos.

use crate::{
    error::{ProberError, Result},
    pipeline::SelectedProbe,
};
use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

const BUILTIN_AMPLIFIERS: &str = include_str!("../assets/amplifiers.json");

/// Initiator halves and their spacers. Spacers may use IUPAC codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amplifier {
    pub up: String,
    pub dn: String,
    #[serde(default)]
    pub upspc: String,
    #[serde(default)]
    pub dnspc: String,
}

impl Amplifier {
    pub fn up_spacer(&self) -> String {
        resolve_iupac_spacer(&self.upspc)
    }

    pub fn dn_spacer(&self) -> String {
        resolve_iupac_spacer(&self.dnspc)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.up.trim().is_empty() || self.dn.trim().is_empty() {
            return Err(ProberError::invalid_config(format!(
                "Amplifier '{name}' needs both 'up' and 'dn' initiators"
            )));
        }
        Ok(())
    }
}

pub type AmplifierSet = BTreeMap<String, Amplifier>;

/// Resolves degenerate spacer bases to the alphabetically first base they stand for.
pub fn resolve_iupac_spacer(spacer: &str) -> String {
    spacer
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'R' | 'W' | 'M' => 'A',
            'Y' | 'S' => 'C',
            'K' => 'G',
            other => other,
        })
        .collect()
}

fn parse_set(text: &str, origin: &str) -> Result<AmplifierSet> {
    let set: AmplifierSet = serde_json::from_str(text).map_err(|e| {
        ProberError::invalid_config(format!("Could not parse amplifiers '{origin}': {e}"))
    })?;
    for (name, amp) in &set {
        amp.validate(name)?;
    }
    Ok(set)
}

pub fn builtin_amplifiers() -> Result<AmplifierSet> {
    parse_set(BUILTIN_AMPLIFIERS, "built-in")
}

/// Loads a JSON file, or every `*.json` in a directory. Unreadable files in a
/// directory are skipped with a warning; an empty result is an error.
pub fn load_amplifiers(path: &Path) -> Result<AmplifierSet> {
    let mut ret = AmplifierSet::new();
    if path.is_dir() {
        let mut files: Vec<_> = fs::read_dir(path)
            .with_context(|| format!("Could not list amplifier directory '{}'", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        for file in files {
            match fs::read_to_string(&file)
                .map_err(ProberError::from)
                .and_then(|text| parse_set(&text, &file.display().to_string()))
            {
                Ok(set) => ret.extend(set),
                Err(e) => warn!("Could not load amplifier file '{}': {e}", file.display()),
            }
        }
    } else if path.is_file() {
        let text = fs::read_to_string(path)?;
        ret = parse_set(&text, &path.display().to_string())?;
    } else {
        return Err(ProberError::not_found(format!(
            "Amplifier path '{}' does not exist",
            path.display()
        )));
    }
    if ret.is_empty() {
        return Err(ProberError::invalid_config(format!(
            "No amplifiers loaded from '{}'",
            path.display()
        )));
    }
    info!("Loaded {} amplifiers: {}", ret.len(), itertools::join(ret.keys(), ", "));
    Ok(ret)
}

/// Fails with `InvalidConfig` naming the first unknown amplifier.
pub fn require_known(set: &AmplifierSet, names: &[String]) -> Result<()> {
    match names.iter().find(|n| !set.contains_key(n.as_str())) {
        Some(missing) => Err(ProberError::invalid_config(format!(
            "Amplifier '{missing}' not found, known: {}",
            itertools::join(set.keys(), ", ")
        ))),
        None => Ok(()),
    }
}

/// An orderable probe pair with initiators attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalProbe {
    pub pair_id: String,
    /// 1-based.
    pub pair_number: usize,
    /// Left arm, spacer, `dn` initiator.
    pub dn_oligo: String,
    /// `up` initiator, spacer, right arm.
    pub up_oligo: String,
    pub sense_start: usize,
    pub pair_len: usize,
}

pub fn final_probes(unit: &str, amplifier: &Amplifier, probes: &[SelectedProbe]) -> Vec<FinalProbe> {
    let up_spacer = amplifier.up_spacer();
    let dn_spacer = amplifier.dn_spacer();
    probes
        .iter()
        .enumerate()
        .map(|(i, p)| FinalProbe {
            pair_id: format!("{unit}_pair_{}", i + 1),
            pair_number: i + 1,
            dn_oligo: format!("{}{}{}", p.left_arm, dn_spacer, amplifier.dn),
            up_oligo: format!("{}{}{}", amplifier.up, up_spacer, p.right_arm),
            sense_start: p.sense_start,
            pair_len: p.left_arm.len() + p.spacer.len() + p.right_arm.len(),
        })
        .collect()
}
