//! NCBI BLAST+ as the alignment backend.

use crate::{
    align::{parse_query_name, AlignmentQuery, Aligner, ReferenceSet},
    classify::HitRecord,
    error::{ErrorCode, ProberError, Result},
};
use bio::io::fasta;
use log::{debug, info, warn};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    process::{Command, Output},
    time::SystemTime,
};

const DEFAULT_BLASTN_BIN: &str = "blastn";
const BLASTN_ENV_BIN: &str = "HCR_PROBER_BLASTN_BIN";
const DEFAULT_MAKEBLASTDB_BIN: &str = "makeblastdb";
const MAKEBLASTDB_ENV_BIN: &str = "HCR_PROBER_MAKEBLASTDB_BIN";
const OUTFMT: &str = "6 qseqid sseqid evalue bitscore qcovhsp";

fn executable(env_var: &str, default: &str) -> String {
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn run_tool(executable: &str, args: &[String]) -> Result<Output> {
    let output = Command::new(executable).args(args).output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            ProberError::external_tool(format!(
                "Could not find executable '{executable}'. Install BLAST+ or put it on PATH"
            ))
        } else {
            ProberError::external_tool(format!(
                "Could not run '{executable}' with args [{}]: {e}",
                args.join(" ")
            ))
        }
    })?;
    if !output.status.success() {
        return Err(ProberError::external_tool(format!(
            "{executable} failed (status={:?}): {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Builds (or reuses) a nucleotide database for `ref_fasta` and returns its
/// prefix. An existing database newer than the FASTA file is kept.
pub fn create_blast_db(ref_fasta: &Path, db_dir: Option<&Path>) -> Result<PathBuf> {
    if !ref_fasta.is_file() {
        return Err(ProberError::not_found(format!(
            "Reference FASTA '{}' does not exist",
            ref_fasta.display()
        )));
    }
    let stem = ref_fasta
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "reference".to_string());
    let db_dir = db_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    let db_name = db_dir.join(&stem);

    let check_file = PathBuf::from(format!("{}.nsq", db_name.display()));
    if let (Some(fasta_time), Some(db_time)) = (modified(ref_fasta), modified(&check_file))
        && fasta_time < db_time
    {
        debug!("Reusing BLAST database {}", db_name.display());
        return Ok(db_name);
    }

    info!("Creating BLAST database for {}", ref_fasta.display());
    fs::create_dir_all(&db_dir)?;
    let args = vec![
        "-in".to_string(),
        ref_fasta.display().to_string(),
        "-dbtype".to_string(),
        "nucl".to_string(),
        "-out".to_string(),
        db_name.display().to_string(),
        "-title".to_string(),
        stem,
    ];
    run_tool(&executable(MAKEBLASTDB_ENV_BIN, DEFAULT_MAKEBLASTDB_BIN), &args)?;
    Ok(db_name)
}

#[derive(Debug, Deserialize)]
struct BlastRow {
    qseqid: String,
    sseqid: String,
    evalue: f64,
    bitscore: f64,
    qcovhsp: f64,
}

/// Parses `-outfmt "6 qseqid sseqid evalue bitscore qcovhsp"` output. Rows
/// whose query is not a candidate name are skipped.
pub fn parse_tabular_hits<R: Read>(reader: R) -> Result<Vec<HitRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .from_reader(reader);
    let mut ret = vec![];
    for row in rdr.deserialize() {
        let row: BlastRow = row?;
        let Some(candidate) = parse_query_name(&row.qseqid) else {
            warn!("Ignoring hit for unknown query '{}'", row.qseqid);
            continue;
        };
        ret.push(HitRecord {
            candidate,
            subject_id: row.sseqid,
            bitscore: row.bitscore,
            evalue: row.evalue,
            coverage: row.qcovhsp / 100.0,
        });
    }
    Ok(ret)
}

fn write_fasta<'a>(path: &Path, records: impl Iterator<Item = (String, &'a [u8])>) -> Result<()> {
    let mut writer = fasta::Writer::new(File::create(path)?);
    for (id, seq) in records {
        writer.write(&id, None, seq)?;
    }
    writer.flush()?;
    Ok(())
}

/// Runs `blastn -task blastn-short`, one process per target kind.
#[derive(Debug, Clone)]
pub struct BlastAligner {
    blastn: String,
    extra_args: Vec<String>,
}

impl BlastAligner {
    pub fn new(extra_args: Vec<String>) -> Self {
        Self {
            blastn: executable(BLASTN_ENV_BIN, DEFAULT_BLASTN_BIN),
            extra_args,
        }
    }

    pub fn with_executable(blastn: &str, extra_args: Vec<String>) -> Self {
        Self {
            blastn: blastn.to_string(),
            extra_args,
        }
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Fails with `ExternalTool` when `blastn` cannot be started.
    pub fn check_available(&self) -> Result<()> {
        run_tool(&self.blastn, &["-version".to_string()]).map(|_| ())
    }

    fn run(&self, query: &Path, target: (&str, &Path), out: &Path) -> Result<Vec<HitRecord>> {
        let mut args = vec![
            "-query".to_string(),
            query.display().to_string(),
            target.0.to_string(),
            target.1.display().to_string(),
            "-out".to_string(),
            out.display().to_string(),
            "-outfmt".to_string(),
            OUTFMT.to_string(),
            "-task".to_string(),
            "blastn-short".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        debug!("{} {}", self.blastn, args.join(" "));
        run_tool(&self.blastn, &args)?;
        parse_tabular_hits(File::open(out)?)
    }
}

impl Aligner for BlastAligner {
    fn search(&self, queries: &[AlignmentQuery], reference: &ReferenceSet) -> Result<Vec<HitRecord>> {
        if reference.is_empty() {
            return Err(ProberError::invalid_config("No reference to search against"));
        }
        if queries.is_empty() {
            return Ok(vec![]);
        }

        let scratch = tempfile::Builder::new()
            .prefix("hcr_prober_")
            .tempdir()
            .map_err(|e| ProberError::new(ErrorCode::Io, format!("Could not create scratch dir: {e}")))?;
        let query_path = scratch.path().join("queries.fasta");
        write_fasta(
            &query_path,
            queries.iter().map(|q| (q.name(), q.sequence.as_slice())),
        )?;

        let mut hits = vec![];
        if let Some(db) = &reference.database {
            let out = scratch.path().join("db_hits.tsv");
            hits.extend(self.run(&query_path, ("-db", db), &out)?);
        }
        if !reference.extra_subjects.is_empty() {
            let subjects = scratch.path().join("subjects.fasta");
            write_fasta(
                &subjects,
                reference
                    .extra_subjects
                    .iter()
                    .map(|(id, seq)| (id.clone(), seq.as_slice())),
            )?;
            let out = scratch.path().join("subject_hits.tsv");
            hits.extend(self.run(&query_path, ("-subject", &subjects), &out)?);
        }
        debug!("{} queries, {} hits", queries.len(), hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tabular_hits() {
        let table = "c0\tENST1\t1e-20\t80.5\t100\nc12\tENST2\t0.001\t30.2\t56\n";
        let hits = parse_tabular_hits(table.as_bytes()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].candidate, 0);
        assert_eq!(hits[0].subject_id, "ENST1");
        assert!((hits[0].bitscore - 80.5).abs() < 1e-9);
        assert!((hits[1].coverage - 0.56).abs() < 1e-9);
        assert_eq!(hits[1].candidate, 12);
    }

    #[test]
    fn test_parse_skips_foreign_queries_and_comments() {
        let table = "# BLASTN 2.15.0+\nquery_7\tX\t1e-30\t90\t100\nc3\tY\t1e-30\t90\t100\n";
        let hits = parse_tabular_hits(table.as_bytes()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].candidate, 3);
    }

    #[test]
    fn test_parse_rejects_malformed_rows() {
        let err = parse_tabular_hits("c1\tX\tnot-a-number\t90\t100\n".as_bytes()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_tabular_hits("".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_executable() {
        let aligner = BlastAligner::with_executable("hcr-prober-no-such-blastn", vec![]);
        let err = aligner.check_available().unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalTool);
    }

    #[test]
    fn test_search_without_reference_is_config_error() {
        let aligner = BlastAligner::with_executable("hcr-prober-no-such-blastn", vec![]);
        let err = aligner.search(&[], &ReferenceSet::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_missing_reference_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_blast_db(&dir.path().join("missing.fa"), Some(dir.path())).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
