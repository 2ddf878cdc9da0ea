//! Re-targets existing order sheets to a different amplifier.

use crate::{
    amplifier::{Amplifier, AmplifierSet},
    error::{ProberError, Result},
};
use log::{error, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

const POOL_COLUMN: &str = "Pool name";
const SEQUENCE_COLUMN: &str = "Sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Up,
    Dn,
}

/// A known initiator and the length of the spacer that sits next to it.
#[derive(Debug, Clone)]
struct Initiator {
    sequence: String,
    spacer_len: usize,
    side: Side,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStats {
    pub swapped: usize,
    pub unchanged: usize,
}

pub struct AmplifierSwap<'a> {
    amplifiers: &'a AmplifierSet,
    new_name: String,
    new_up_prefix: String,
    new_dn_suffix: String,
    initiators: Vec<Initiator>,
}

impl<'a> AmplifierSwap<'a> {
    pub fn new(amplifiers: &'a AmplifierSet, new_name: &str) -> Result<Self> {
        let new: &Amplifier = amplifiers.get(new_name).ok_or_else(|| {
            ProberError::invalid_config(format!("New amplifier '{new_name}' not found"))
        })?;
        let ups = amplifiers.values().map(|a| Initiator {
            sequence: a.up.to_ascii_uppercase(),
            spacer_len: a.upspc.len(),
            side: Side::Up,
        });
        let dns = amplifiers.values().map(|a| Initiator {
            sequence: a.dn.to_ascii_uppercase(),
            spacer_len: a.dnspc.len(),
            side: Side::Dn,
        });
        Ok(Self {
            amplifiers,
            new_name: new_name.to_string(),
            new_up_prefix: format!("{}{}", new.up, new.up_spacer()),
            new_dn_suffix: format!("{}{}", new.dn_spacer(), new.dn),
            initiators: ups.chain(dns).collect(),
        })
    }

    /// Replaces initiator and spacer, keeping the target-binding part. `None`
    /// when no known initiator is found at the expected end.
    pub fn swap_sequence(&self, seq: &str) -> Option<String> {
        if !seq.is_ascii() {
            return None;
        }
        let upper = seq.to_ascii_uppercase();
        for init in &self.initiators {
            let cut = init.sequence.len() + init.spacer_len;
            if init.sequence.is_empty() || seq.len() < cut {
                continue;
            }
            match init.side {
                Side::Up if upper.starts_with(&init.sequence) => {
                    return Some(format!("{}{}", self.new_up_prefix, &seq[cut..]));
                }
                Side::Dn if upper.ends_with(&init.sequence) => {
                    return Some(format!("{}{}", &seq[..seq.len() - cut], self.new_dn_suffix));
                }
                _ => {}
            }
        }
        None
    }

    /// `B1_ACTB_PP20` becomes `B3_ACTB_PP20`; unknown prefixes get the new
    /// name prepended.
    pub fn swap_pool_name(&self, old: &str) -> String {
        match old.split_once('_') {
            Some((prefix, rest)) if self.amplifiers.contains_key(prefix) => {
                format!("{}_{rest}", self.new_name)
            }
            _ => format!("{}_{old}", self.new_name),
        }
    }

    pub fn swap_file(&self, input: &Path, output: &Path) -> Result<SwapStats> {
        let mut rdr = csv::Reader::from_path(input)?;
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                ProberError::invalid_input(format!(
                    "'{}' has no '{name}' column",
                    input.display()
                ))
            })
        };
        let pool_col = column(POOL_COLUMN)?;
        let seq_col = column(SEQUENCE_COLUMN)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(output)?;
        wtr.write_record(&headers)?;
        let mut stats = SwapStats::default();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if let Some(seq) = row.get(seq_col).cloned() {
                match self.swap_sequence(&seq) {
                    Some(swapped) => {
                        row[seq_col] = swapped;
                        stats.swapped += 1;
                    }
                    None => {
                        let head: String = seq.chars().take(10).collect();
                        warn!("Could not identify initiator for '{head}...', keeping as-is");
                        stats.unchanged += 1;
                    }
                }
            }
            if let Some(pool) = row.get(pool_col).cloned() {
                row[pool_col] = self.swap_pool_name(&pool);
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        info!("Saved swapped file to {}", output.display());
        Ok(stats)
    }
}

fn collect_csv(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "csv") {
            out.push(path);
        }
    }
    Ok(())
}

/// Swaps a single sheet or every `*.csv` below a directory. Returns the files
/// written. In directory mode a failing sheet is logged and skipped.
pub fn swap_path(
    input: &Path,
    output_dir: &Path,
    amplifiers: &AmplifierSet,
    new_name: &str,
) -> Result<Vec<PathBuf>> {
    let swap = AmplifierSwap::new(amplifiers, new_name)?;
    let target = |file: &Path| {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        output_dir.join(format!("{stem}_swapped_to_{new_name}.csv"))
    };
    fs::create_dir_all(output_dir)?;

    if input.is_file() {
        let out = target(input);
        swap.swap_file(input, &out)?;
        return Ok(vec![out]);
    }
    if !input.is_dir() {
        return Err(ProberError::not_found(format!(
            "Input path '{}' not found",
            input.display()
        )));
    }

    let mut files = vec![];
    collect_csv(input, &mut files)?;
    files.sort();
    if files.is_empty() {
        warn!("No .csv files found in '{}'", input.display());
    }
    let mut written = vec![];
    for file in files {
        info!("Processing {}", file.display());
        let out = target(&file);
        match swap.swap_file(&file, &out) {
            Ok(_) => written.push(out),
            Err(e) => error!("Failed to swap '{}': {e}", file.display()),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        amplifier::{builtin_amplifiers, final_probes},
        output::write_order_sheet,
        pipeline::SelectedProbe,
    };

    fn probe(left: &str, right: &str) -> SelectedProbe {
        SelectedProbe {
            candidate: 0,
            start: 0,
            sense_start: 0,
            left_arm: left.to_string(),
            spacer: "AA".to_string(),
            right_arm: right.to_string(),
            gc_left: 0.0,
            gc_right: 0.0,
            tm_left: None,
            tm_right: None,
        }
    }

    #[test]
    fn test_swap_sequences() {
        let set = builtin_amplifiers().unwrap();
        let swap = AmplifierSwap::new(&set, "B3").unwrap();
        let fin = final_probes("G", &set["B1"], &[probe("ACGTACGTAC", "TTGGCCAATT")]);
        let dn = swap.swap_sequence(&fin[0].dn_oligo).unwrap();
        let up = swap.swap_sequence(&fin[0].up_oligo).unwrap();
        let expected = final_probes("G", &set["B3"], &[probe("ACGTACGTAC", "TTGGCCAATT")]);
        assert_eq!(dn, expected[0].dn_oligo);
        assert_eq!(up, expected[0].up_oligo);
        assert_eq!(swap.swap_sequence("ACGTACGTACGTACGT"), None);
    }

    #[test]
    fn test_swap_pool_name() {
        let set = builtin_amplifiers().unwrap();
        let swap = AmplifierSwap::new(&set, "B5").unwrap();
        assert_eq!(swap.swap_pool_name("B1_ACTB_PP20"), "B5_ACTB_PP20");
        assert_eq!(swap.swap_pool_name("mypool"), "B5_mypool");
        assert_eq!(swap.swap_pool_name("X1_ACTB"), "B5_X1_ACTB");
    }

    #[test]
    fn test_unknown_new_amplifier() {
        let set = builtin_amplifiers().unwrap();
        assert!(AmplifierSwap::new(&set, "B42").is_err());
    }

    #[test]
    fn test_swap_directory_round_trip() {
        let set = builtin_amplifiers().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("in/ACTB/B1");
        fs::create_dir_all(&nested).unwrap();
        let probes = vec![probe("ACGTACGTAC", "TTGGCCAATT"), probe("GGGGACGTAC", "TTGGCCAAAA")];
        let fin = final_probes("ACTB", &set["B1"], &probes);
        write_order_sheet(&nested.join("ACTB_B1_order.csv"), "B1_ACTB_PP2", &fin).unwrap();
        fs::write(dir.path().join("in/notes.txt"), "ignored").unwrap();

        let out_dir = dir.path().join("out");
        let written = swap_path(&dir.path().join("in"), &out_dir, &set, "B2").unwrap();
        assert_eq!(written, vec![out_dir.join("ACTB_B1_order_swapped_to_B2.csv")]);

        let text = fs::read_to_string(&written[0]).unwrap();
        let expected = final_probes("ACTB", &set["B2"], &probes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Pool name,Sequence");
        assert_eq!(lines[1], format!("B2_ACTB_PP2,{}", expected[0].dn_oligo));
        assert_eq!(lines[4], format!("B2_ACTB_PP2,{}", expected[1].up_oligo));
    }

    #[test]
    fn test_missing_columns() {
        let set = builtin_amplifiers().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        fs::write(&input, "Name,Seq\nx,ACGT\n").unwrap();
        let swap = AmplifierSwap::new(&set, "B2").unwrap();
        let err = swap.swap_file(&input, &dir.path().join("o.csv")).unwrap_err();
        assert!(err.message.contains("Pool name"));
    }
}
