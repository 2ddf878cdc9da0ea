//! Files written for one (unit, amplifier) pair.
//!
//! Layout: `<base>/<unit>/<amplifier>/<unit>_<amplifier>_{summary.txt,order.csv,
//! probes.fasta,probe_map.svg,report.json}`. The summary and JSON report are
//! always written; the order sheet, FASTA and map only when probes remain.

use crate::{
    amplifier::{final_probes, Amplifier, FinalProbe},
    config::DesignConfig,
    error::Result,
    pipeline::DesignOutcome,
};
use bio::io::fasta;
use log::{info, warn};
use serde::Serialize;
use std::{
    fmt,
    fs::{self, File},
    path::{Path, PathBuf},
};
use svg::node::element::{Line, Rectangle, Text};
use svg::Document;

const MAP_WIDTH: f64 = 800.0;
const MAP_HEIGHT: f64 = 150.0;
const MAP_PADDING: f64 = 20.0;
const TRACK_HEIGHT: f64 = 10.0;
const PAIR_COLORS: [&str; 6] = ["#3498db", "#e74c3c", "#2ecc71", "#f1c40f", "#9b59b6", "#1abc9c"];
const RULE: &str = "======================================================================";

/// Everything the writers need about one finished unit.
pub struct UnitReport<'a> {
    pub unit: &'a str,
    pub amplifier_name: &'a str,
    pub amplifier: &'a Amplifier,
    pub outcome: &'a DesignOutcome,
    pub config: &'a DesignConfig,
}

impl UnitReport<'_> {
    pub fn final_probes(&self) -> Vec<FinalProbe> {
        final_probes(self.unit, self.amplifier, &self.outcome.probes)
    }

    pub fn pool_name(&self) -> String {
        self.config.pool_name.clone().unwrap_or_else(|| {
            format!(
                "{}_{}_PP{}",
                self.amplifier_name,
                self.unit,
                self.outcome.probes.len()
            )
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenFiles {
    pub summary: PathBuf,
    pub report: PathBuf,
    pub order: Option<PathBuf>,
    pub fasta: Option<PathBuf>,
    pub probe_map: Option<PathBuf>,
}

pub fn unit_dir(base: &Path, unit: &str, amplifier: &str) -> PathBuf {
    base.join(unit).join(amplifier)
}

pub fn write_unit(base: &Path, report: &UnitReport) -> Result<WrittenFiles> {
    let dir = unit_dir(base, report.unit, report.amplifier_name);
    fs::create_dir_all(&dir)?;
    let stem = format!("{}_{}", report.unit, report.amplifier_name);
    let probes = report.final_probes();

    let mut files = WrittenFiles {
        summary: dir.join(format!("{stem}_summary.txt")),
        report: dir.join(format!("{stem}_report.json")),
        ..Default::default()
    };
    fs::write(&files.summary, summary_text(report))?;
    write_json_report(&files.report, report, &probes)?;

    if probes.is_empty() {
        warn!(
            "No final probes for '{}' with amplifier {}, see {}",
            report.unit,
            report.amplifier_name,
            files.summary.display()
        );
        return Ok(files);
    }

    let order = dir.join(format!("{stem}_order.csv"));
    write_order_sheet(&order, &report.pool_name(), &probes)?;
    let fasta = dir.join(format!("{stem}_probes.fasta"));
    write_probes_fasta(&fasta, &probes)?;
    let map = dir.join(format!("{stem}_probe_map.svg"));
    fs::write(
        &map,
        probe_map_svg(
            report.unit,
            report.amplifier_name,
            report.outcome.transcript_len,
            &probes,
        ),
    )?;
    files.order = Some(order);
    files.fasta = Some(fasta);
    files.probe_map = Some(map);
    info!(
        "Wrote {} probe pairs for '{} - {}' to {}",
        probes.len(),
        report.unit,
        report.amplifier_name,
        dir.display()
    );
    Ok(files)
}

/// Human-readable run summary, written even when nothing survived.
pub fn summary_text(report: &UnitReport) -> String {
    report.to_string()
}

impl fmt::Display for UnitReport<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfg = self.config;
        let outcome = self.outcome;
        let f = &outcome.funnel;

        writeln!(
            out,
            "HCR-prober v{} Summary for: {} | Amplifier: {}",
            env!("CARGO_PKG_VERSION"),
            self.unit,
            self.amplifier_name
        )?;
        writeln!(out, "{RULE}")?;
        if outcome.is_failure() {
            writeln!(out, "\n*** PIPELINE FAILED TO PRODUCE ANY FINAL PROBES ***")?;
        }

        writeln!(out, "\n--- Run Parameters ---")?;
        writeln!(out, "  Target: {}", outcome.transcript_id)?;
        writeln!(out, "  Target Sequence Length: {} nt", outcome.transcript_len)?;
        writeln!(out, "  5' Skip: {} nt", cfg.skip_5prime)?;
        writeln!(
            out,
            "  Pair Geometry: {} + {} + {} nt",
            cfg.arm_len, cfg.spacer_len, cfg.arm_len
        )?;
        let range = |min: Option<f64>, max: Option<f64>| match (min, max) {
            (None, None) => "off".to_string(),
            (min, max) => format!(
                "{}-{}",
                min.map_or("*".to_string(), |v| v.to_string()),
                max.map_or("*".to_string(), |v| v.to_string())
            ),
        };
        writeln!(out, "  GC Range: {} %", range(cfg.filter.min_gc, cfg.filter.max_gc))?;
        writeln!(out, "  Tm Range: {} C", range(cfg.filter.min_tm, cfg.filter.max_tm))?;
        if let Some(max) = cfg.filter.max_homopolymer {
            writeln!(out, "  Max Homopolymer: {max}")?;
        }
        if let Some(diff) = cfg.filter.max_gc_diff {
            writeln!(out, "  Max Arm GC Difference: {diff} %")?;
        }
        writeln!(out, "  Min Probe Distance: {} nt", cfg.min_probe_distance)?;
        writeln!(out, "  Max Probes: {}", cfg.max_probes)?;
        if let Some(blast_ref) = &cfg.blast_ref {
            writeln!(
                out,
                "  BLAST Reference: {}",
                blast_ref
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            )?;
            writeln!(out, "  Bitscore Cutoff: {}", cfg.thresholds.min_bitscore)?;
            writeln!(out, "  E-value Cutoff: {:e}", cfg.thresholds.max_evalue)?;
        }
        if let Some(strategy) = &outcome.strategy {
            writeln!(out, "  Selection Strategy: {strategy}")?;
        }

        writeln!(out, "\n--- Filtering Funnel ---")?;
        writeln!(out, "  {:>7} Candidate Windows", f.raw)?;
        for (stage, left) in f.filter.stages() {
            writeln!(out, "  {left:>7} After {} Filter", stage.label())?;
        }
        if let Some(n) = f.post_partition {
            writeln!(out, "  {n:>7} After Isoform Partitioning")?;
        }
        match f.post_classification {
            Some(n) => {
                writeln!(out, "  {n:>7} After Specificity Screen")?;
            }
            None => {
                writeln!(out, "          Specificity Screen Skipped")?;
            }
        }
        writeln!(out, "  {:>7} After Spacing Selection", f.post_spacing)?;
        writeln!(out, "  ---------------------------")?;
        writeln!(out, "  {:>7} Final Probe Pairs", f.selected)?;

        if let Some(best) = &outcome.best_subject {
            writeln!(out, "\n--- Best Supported Subject ---")?;
            writeln!(
                out,
                "  {} (coverage {}, mean bitscore {:.2})",
                best.subject_id, best.coverage, best.mean_bitscore
            )?;
        }

        if outcome.strategy.is_some() {
            writeln!(out, "\n{RULE}\n--- DETAILED BLAST REPORT ---\n{RULE}")?;
            if outcome.strong_hits.is_empty() {
                writeln!(out, "\n[+] No BLAST hits passed the bitscore/e-value filter.")?;
            } else {
                writeln!(out, "\n[+] High-quality hits of every screened candidate:")?;
                writeln!(
                    out,
                    "  {:>9}  {:<30}  {:>9}  {:>10}  {:>8}",
                    "candidate", "subject", "bitscore", "evalue", "coverage"
                )?;
                for hit in &outcome.strong_hits {
                    writeln!(
                        out,
                        "  {:>9}  {:<30}  {:>9.1}  {:>10.2e}  {:>7.0}%",
                        hit.candidate,
                        hit.subject_id,
                        hit.bitscore,
                        hit.evalue,
                        hit.coverage * 100.0
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Two rows per pair, `dn` oligo first.
pub fn write_order_sheet(path: &Path, pool_name: &str, probes: &[FinalProbe]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Pool name", "Sequence"])?;
    for p in probes {
        wtr.write_record([pool_name, p.dn_oligo.as_str()])?;
        wtr.write_record([pool_name, p.up_oligo.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `{pair_id}_A` is the `dn` oligo, `{pair_id}_B` the `up` oligo.
pub fn write_probes_fasta(path: &Path, probes: &[FinalProbe]) -> Result<()> {
    let mut writer = fasta::Writer::new(File::create(path)?);
    for p in probes {
        writer.write(&format!("{}_A", p.pair_id), None, p.dn_oligo.as_bytes())?;
        writer.write(&format!("{}_B", p.pair_id), None, p.up_oligo.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn probe_map_svg(unit: &str, amplifier: &str, seq_len: usize, probes: &[FinalProbe]) -> String {
    let track_y = MAP_HEIGHT / 2.0;
    let track_width = MAP_WIDTH - 2.0 * MAP_PADDING;
    let scale = if seq_len > 0 {
        track_width / seq_len as f64
    } else {
        0.0
    };

    let mut doc = Document::new()
        .set("viewBox", (0, 0, MAP_WIDTH, MAP_HEIGHT))
        .set("width", MAP_WIDTH)
        .set("height", MAP_HEIGHT)
        .add(
            Text::new(format!("Probe Map: {unit} ({amplifier})"))
                .set("x", MAP_WIDTH / 2.0)
                .set("y", MAP_PADDING + 5.0)
                .set("text-anchor", "middle")
                .set("font-family", "sans-serif")
                .set("font-weight", "bold")
                .set("font-size", 20),
        )
        .add(
            Rectangle::new()
                .set("x", MAP_PADDING)
                .set("y", track_y)
                .set("width", track_width)
                .set("height", TRACK_HEIGHT)
                .set("fill", "#bdc3c7"),
        )
        .add(
            Text::new("0")
                .set("x", MAP_PADDING)
                .set("y", track_y + TRACK_HEIGHT + 15.0)
                .set("font-family", "sans-serif")
                .set("font-size", 12),
        )
        .add(
            Text::new(seq_len.to_string())
                .set("x", MAP_WIDTH - MAP_PADDING)
                .set("y", track_y + TRACK_HEIGHT + 15.0)
                .set("text-anchor", "end")
                .set("font-family", "sans-serif")
                .set("font-size", 12),
        );

    for (i, p) in probes.iter().enumerate() {
        let x = MAP_PADDING + p.sense_start as f64 * scale;
        let width = (p.pair_len as f64 * scale).max(1.0);
        // alternate above and below the track
        let y = if i % 2 == 0 {
            track_y - TRACK_HEIGHT
        } else {
            track_y + TRACK_HEIGHT
        };
        doc = doc.add(
            Rectangle::new()
                .set("x", x)
                .set("y", y)
                .set("width", width)
                .set("height", TRACK_HEIGHT)
                .set("fill", PAIR_COLORS[i % PAIR_COLORS.len()])
                .set("data-pair", p.pair_number)
                .set("data-start", p.sense_start),
        );
    }

    if let (Some(first), Some(last)) = (probes.first(), probes.last()) {
        let y = track_y - 2.0 * TRACK_HEIGHT;
        doc = doc.add(
            Line::new()
                .set("x1", MAP_PADDING + first.sense_start.min(last.sense_start) as f64 * scale)
                .set("y1", y)
                .set(
                    "x2",
                    MAP_PADDING
                        + (first.sense_start.max(last.sense_start) + last.pair_len) as f64 * scale,
                )
                .set("y2", y)
                .set("stroke", "#7f8c8d")
                .set("stroke-width", 1),
        );
    }

    doc.to_string()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    unit: &'a str,
    amplifier: &'a str,
    pool_name: String,
    outcome: &'a DesignOutcome,
    final_probes: &'a [FinalProbe],
}

fn write_json_report(path: &Path, report: &UnitReport, probes: &[FinalProbe]) -> Result<()> {
    let json = JsonReport {
        unit: report.unit,
        amplifier: report.amplifier_name,
        pool_name: report.pool_name(),
        outcome: report.outcome,
        final_probes: probes,
    };
    fs::write(path, serde_json::to_string_pretty(&json)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::{HitRecord, SubjectScore},
        pipeline::{SelectedProbe, StageFunnel},
    };

    fn amp() -> Amplifier {
        Amplifier {
            up: "GAGGAGGGCAGCAAACGG".to_string(),
            dn: "GAAGAGTCTTCCTTTACG".to_string(),
            upspc: "AA".to_string(),
            dnspc: "TA".to_string(),
        }
    }

    fn selected(start: usize) -> SelectedProbe {
        SelectedProbe {
            candidate: start,
            start,
            sense_start: 400 - start - 52,
            left_arm: "A".repeat(25),
            spacer: "GC".to_string(),
            right_arm: "C".repeat(25),
            gc_left: 0.0,
            gc_right: 100.0,
            tm_left: Some(40.0),
            tm_right: Some(70.0),
        }
    }

    fn outcome(probes: Vec<SelectedProbe>) -> DesignOutcome {
        DesignOutcome {
            transcript_id: "ACTB".to_string(),
            transcript_len: 400,
            strategy: Some("best-coverage".to_string()),
            funnel: StageFunnel {
                raw: 249,
                post_filter: 100,
                post_classification: Some(50),
                post_spacing: probes.len(),
                selected: probes.len(),
                ..Default::default()
            },
            probes,
            best_subject: Some(SubjectScore {
                subject_id: "ENST0001".to_string(),
                coverage: 50,
                mean_bitscore: 88.25,
            }),
            strong_hits: vec![HitRecord {
                candidate: 3,
                subject_id: "ENST0001".to_string(),
                bitscore: 90.0,
                evalue: 1e-22,
                coverage: 1.0,
            }],
        }
    }

    #[test]
    fn test_write_unit_with_probes() {
        let dir = tempfile::tempdir().unwrap();
        let config = DesignConfig::default();
        let amp = amp();
        let outcome = outcome(vec![selected(0), selected(100), selected(200)]);
        let report = UnitReport {
            unit: "ACTB",
            amplifier_name: "B1",
            amplifier: &amp,
            outcome: &outcome,
            config: &config,
        };
        let files = write_unit(dir.path(), &report).unwrap();
        assert_eq!(files.summary, dir.path().join("ACTB/B1/ACTB_B1_summary.txt"));

        let order = fs::read_to_string(files.order.unwrap()).unwrap();
        let lines: Vec<&str> = order.lines().collect();
        assert_eq!(lines[0], "Pool name,Sequence");
        assert_eq!(lines.len(), 1 + 6);
        assert_eq!(
            lines[1],
            format!("B1_ACTB_PP3,{}TAGAAGAGTCTTCCTTTACG", "A".repeat(25))
        );
        assert_eq!(
            lines[2],
            format!("B1_ACTB_PP3,GAGGAGGGCAGCAAACGGAA{}", "C".repeat(25))
        );

        let records: Vec<_> = fasta::Reader::from_file(files.fasta.unwrap())
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].id(), "ACTB_pair_1_A");
        assert_eq!(records[1].id(), "ACTB_pair_1_B");
        assert!(records[1].seq().starts_with(b"GAGGAGGGCAGCAAACGG"));

        let svg = fs::read_to_string(files.probe_map.unwrap()).unwrap();
        assert!(svg.contains("Probe Map: ACTB (B1)"));
        assert_eq!(svg.matches("data-pair").count(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(files.report).unwrap()).unwrap();
        assert_eq!(json["pool_name"], "B1_ACTB_PP3");
        assert_eq!(json["final_probes"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_failure_writes_summary_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = DesignConfig {
            pool_name: Some("custom".to_string()),
            ..Default::default()
        };
        let amp = amp();
        let outcome = outcome(vec![]);
        let report = UnitReport {
            unit: "ACTB",
            amplifier_name: "B1",
            amplifier: &amp,
            outcome: &outcome,
            config: &config,
        };
        assert_eq!(report.pool_name(), "custom");
        let files = write_unit(dir.path(), &report).unwrap();
        assert!(files.order.is_none());
        assert!(files.fasta.is_none());
        let summary = fs::read_to_string(&files.summary).unwrap();
        assert!(summary.contains("FAILED TO PRODUCE ANY FINAL PROBES"));
        assert!(files.report.is_file());
    }

    #[test]
    fn test_summary_lists_funnel_and_hits() {
        let config = DesignConfig::default();
        let amp = amp();
        let outcome = outcome(vec![selected(0)]);
        let report = UnitReport {
            unit: "ACTB",
            amplifier_name: "B1",
            amplifier: &amp,
            outcome: &outcome,
            config: &config,
        };
        let summary = summary_text(&report);
        assert!(summary.contains("Summary for: ACTB | Amplifier: B1"));
        assert!(summary.contains("249 Candidate Windows"));
        assert!(summary.contains("50 After Specificity Screen"));
        assert!(summary.contains("1 Final Probe Pairs"));
        assert!(summary.contains("ENST0001 (coverage 50, mean bitscore 88.25)"));
        assert!(summary.contains("GC Range: off %"));
        assert!(!summary.contains("FAILED"));
        assert_eq!(format!("{report}"), summary);
    }

    #[test]
    fn test_summary_without_screen() {
        let config = DesignConfig::default();
        let amp = amp();
        let mut outcome = outcome(vec![]);
        outcome.strategy = None;
        outcome.best_subject = None;
        outcome.funnel.post_classification = None;
        let report = UnitReport {
            unit: "ACTB",
            amplifier_name: "B2",
            amplifier: &amp,
            outcome: &outcome,
            config: &config,
        };
        let summary = summary_text(&report);
        assert!(summary.contains("Specificity Screen Skipped"));
        assert!(summary.contains("FAILED TO PRODUCE ANY FINAL PROBES"));
        assert!(!summary.contains("DETAILED BLAST REPORT"));
    }
}
