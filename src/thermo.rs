//! Nearest-neighbour melting temperature for probe arms.
//!
//! Thermodynamic parameters are the Allawi & SantaLucia (1997) DNA/DNA table, with
//! terminal A/T and G/C initiation terms and the entropy salt correction
//! `0.368 * (N - 1) * ln[Na+]` (SantaLucia 1998). Divalent cations are folded into
//! the monovalent equivalent as `120 * sqrt([Mg2+] - [dNTP])` (von Ahsen et al. 2001).
//! This reproduces the values of BioPython's `Tm_NN` with its default table and
//! salt correction method 5.

use serde::{Deserialize, Serialize};

/// Universal gas constant, cal / (K * mol).
const R: f64 = 1.987;

const INIT_AT: (f64, f64) = (2.3, 4.1);
const INIT_GC: (f64, f64) = (0.1, -2.8);

/// Ion and strand concentrations of the hybridization buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermoConditions {
    /// mM
    pub na: f64,
    /// mM
    pub k: f64,
    /// mM
    pub tris: f64,
    /// mM
    pub mg: f64,
    /// mM
    pub dntps: f64,
    /// Concentration of the higher-concentrated strand, nM.
    pub dnac1: f64,
    /// Concentration of the lower-concentrated strand, nM.
    pub dnac2: f64,
}

impl Default for ThermoConditions {
    fn default() -> Self {
        Self {
            na: 50.0,
            k: 0.0,
            tris: 0.0,
            mg: 0.0,
            dntps: 0.0,
            dnac1: 25.0,
            dnac2: 25.0,
        }
    }
}

/// Enthalpy (kcal/mol) and entropy (cal/K/mol) of a stacked pair, read 5' to 3'
/// on the top strand.
fn dh_ds_neighbors(neighbors: (u8, u8)) -> Option<(f64, f64)> {
    let v = match neighbors {
        (b'A', b'A') | (b'T', b'T') => (-7.9, -22.2),
        (b'A', b'T') => (-7.2, -20.4),
        (b'T', b'A') => (-7.2, -21.3),
        (b'C', b'A') | (b'T', b'G') => (-8.5, -22.7),
        (b'G', b'T') | (b'A', b'C') => (-8.4, -22.4),
        (b'C', b'T') | (b'A', b'G') => (-7.8, -21.0),
        (b'G', b'A') | (b'T', b'C') => (-8.2, -22.2),
        (b'C', b'G') => (-10.6, -27.2),
        (b'G', b'C') => (-9.8, -24.4),
        (b'G', b'G') | (b'C', b'C') => (-8.0, -19.9),
        _ => return None,
    };
    Some(v)
}

fn salt_correction(len: usize, cond: &ThermoConditions) -> Option<f64> {
    let mut mon = cond.na + cond.k + cond.tris / 2.0;
    if (cond.k > 0.0 || cond.mg > 0.0 || cond.tris > 0.0 || cond.dntps > 0.0)
        && cond.dntps < cond.mg
    {
        mon += 120.0 * (cond.mg - cond.dntps).sqrt();
    }
    let mon_molar = mon * 1e-3;
    if mon_molar <= 0.0 {
        return None;
    }
    Some(0.368 * (len as f64 - 1.0) * mon_molar.ln())
}

/// Melting temperature in C. Returns `None` for sequences shorter than two bases,
/// bases outside A/C/G/T, or a buffer without monovalent ions.
pub fn calc_tm(seq: &[u8], cond: &ThermoConditions) -> Option<f64> {
    if seq.len() < 2 {
        return None;
    }
    let seq: Vec<u8> = seq.iter().map(|c| c.to_ascii_uppercase()).collect();

    let mut dh = 0.0;
    let mut ds = 0.0;

    for nt in [seq[0], seq[seq.len() - 1]] {
        let (h, s) = match nt {
            b'A' | b'T' => INIT_AT,
            b'G' | b'C' => INIT_GC,
            _ => return None,
        };
        dh += h;
        ds += s;
    }

    for pair in seq.windows(2) {
        let (h, s) = dh_ds_neighbors((pair[0], pair[1]))?;
        dh += h;
        ds += s;
    }

    ds += salt_correction(seq.len(), cond)?;

    // Non-self-complementary duplex: C_T / 4 for equal strand concentrations.
    let k = (cond.dnac1 - cond.dnac2 / 2.0) * 1e-9;
    if k <= 0.0 {
        return None;
    }

    Some((1_000.0 * dh) / (ds + R * k.ln()) - 273.15)
}
