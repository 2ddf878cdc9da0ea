use crate::error::{ProberError, Result};
use anyhow::Context;
use bio::io::fasta;
use std::{fs::File, path::Path};

pub type TranscriptId = String;

/// A target transcript, sense strand, upper-case A/C/G/T only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    id: TranscriptId,
    sequence: Vec<u8>,
}

impl Transcript {
    /// Validates and normalises the sequence. Empty sequences and anything
    /// outside the A/C/G/T alphabet are rejected.
    pub fn new(id: &str, sequence: &[u8]) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(ProberError::invalid_input("Transcript id is empty"));
        }
        if sequence.is_empty() {
            return Err(ProberError::invalid_input(format!(
                "Transcript '{id}' has an empty sequence"
            )));
        }
        let sequence: Vec<u8> = sequence.iter().map(|c| c.to_ascii_uppercase()).collect();
        if let Some(pos) = sequence
            .iter()
            .position(|c| !matches!(c, b'A' | b'C' | b'G' | b'T'))
        {
            return Err(ProberError::invalid_input(format!(
                "Transcript '{id}' contains invalid character '{}' at position {}",
                sequence[pos] as char,
                pos + 1
            )));
        }
        Ok(Self {
            id: id.to_string(),
            sequence,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The antisense strand probes are designed on.
    pub fn antisense(&self) -> Vec<u8> {
        reverse_complement(&self.sequence)
    }

    /// Gene-group prefix: the id up to the first `delimiter`.
    pub fn gene_prefix(&self, delimiter: &str) -> &str {
        split_isoform_id(&self.id, delimiter).0
    }

    /// Isoform suffix: the id after the first `delimiter`, if any.
    pub fn isoform_suffix(&self, delimiter: &str) -> Option<&str> {
        split_isoform_id(&self.id, delimiter).1
    }
}

pub fn split_isoform_id<'a>(id: &'a str, delimiter: &str) -> (&'a str, Option<&'a str>) {
    if delimiter.is_empty() {
        return (id, None);
    }
    match id.split_once(delimiter) {
        Some((prefix, suffix)) => (prefix, Some(suffix)),
        None => (id, None),
    }
}

#[inline(always)]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        other => other,
    }
}

pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|b| complement(*b)).collect()
}

/// GC content in percent (0 to 100). Empty input gives 0.
pub fn gc_percent(sequence: &[u8]) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence
        .iter()
        .map(|c| c.to_ascii_uppercase())
        .filter(|&c| c == b'G' || c == b'C')
        .count() as f64;
    gc / sequence.len() as f64 * 100.0
}

/// Length of the longest run of a single repeated base.
pub fn max_homopolymer_run(sequence: &[u8]) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;
    for base in sequence.iter().map(|c| c.to_ascii_uppercase()) {
        if Some(base) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(base);
        }
        best = best.max(run);
    }
    best
}

/// Reads every record of a FASTA file, validating each as a transcript.
pub fn read_transcripts(path: &Path) -> Result<Vec<Transcript>> {
    let records = read_fasta_records(path)?;
    if records.is_empty() {
        return Err(ProberError::invalid_input(format!(
            "No FASTA records found in '{}'",
            path.display()
        )));
    }
    records
        .iter()
        .map(|(id, seq)| Transcript::new(id, seq))
        .collect()
}

/// Raw `(id, sequence)` pairs, without alphabet validation.
pub fn read_fasta_records(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let file = File::open(path)
        .with_context(|| format!("Could not open FASTA file '{}'", path.display()))?;
    let mut ret = vec![];
    for record in fasta::Reader::new(file).records() {
        let record = record
            .with_context(|| format!("Malformed FASTA record in '{}'", path.display()))?;
        ret.push((record.id().to_string(), record.seq().to_vec()));
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGT"), b"ACGTT".to_vec());
        assert_eq!(reverse_complement(b""), Vec::<u8>::new());
    }

    #[test]
    fn test_transcript_normalises_case() {
        let t = Transcript::new("Sox2_201", b"acgtACGT").unwrap();
        assert_eq!(t.sequence(), b"ACGTACGT");
        assert_eq!(t.gene_prefix("_"), "Sox2");
        assert_eq!(t.isoform_suffix("_"), Some("201"));
    }

    #[test]
    fn test_transcript_rejects_bad_input() {
        let err = Transcript::new("x", b"").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
        let err = Transcript::new("x", b"ACGNT").unwrap_err();
        assert!(err.message.contains("position 4"));
    }

    #[test]
    fn test_gc_and_homopolymer() {
        assert_eq!(gc_percent(b"GGCCAATT"), 50.0);
        assert_eq!(gc_percent(b""), 0.0);
        assert_eq!(max_homopolymer_run(b"ACGTTTTAC"), 4);
        assert_eq!(max_homopolymer_run(b"A"), 1);
        assert_eq!(max_homopolymer_run(b""), 0);
    }

    #[test]
    fn test_read_transcripts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ">geneA_1\nACGTACGT\nAAAA\n>geneA_2\nccccgggg").unwrap();
        let transcripts = read_transcripts(file.path()).unwrap();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0].len(), 12);
        assert_eq!(transcripts[1].sequence(), b"CCCCGGGG");
    }
}
