use hcr_prober::{
    about,
    align::{Aligner, ReferenceSet},
    amplifier::{builtin_amplifiers, load_amplifiers, require_known, AmplifierSet},
    blast::{create_blast_db, BlastAligner},
    config::DesignConfig,
    isoform::group_by_prefix,
    jobs::{configure_threads, run_units, UnitResult},
    output::{write_unit, UnitReport},
    pipeline::{DesignOutcome, Specificity},
    sequence::{read_transcripts, Transcript},
    swap::swap_path,
};
use log::{info, warn, Level};
use serde::Serialize;
use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

fn usage() {
    eprintln!(
        "Usage:\n  \
  hcr_prober --version\n  \
  hcr_prober [GLOBAL] design -i FASTA --amplifier B1 [B2 ...] [-o DIR] [--gene-name ID] [--pool-name NAME] [DESIGN]\n  \
  hcr_prober [GLOBAL] isoform-split -i FASTA --gene-prefix P [P ...] --amplifier B1 [...] [-o DIR] [--delimiter _] [DESIGN]\n  \
  hcr_prober [GLOBAL] swap --input-probes PATH --new-amplifier NAME [--output-dir DIR]\n\n  \
  GLOBAL: --config PATH --amplifiers PATH --threads N --verbose --json\n  \
  DESIGN: --max-probes N --skip-5prime N --mask-sequences FASTA --min-gc X --max-gc X\n  \
          --min-tm X --max-tm X --max-homopolymer N --max-gc-diff X --arm-len N --spacer-len N\n  \
          --min-probe-distance N --blast-ref FASTA --db-path DIR --strategy NAME\n  \
          --target-transcript-id ID --common-strategy NAME --unique-strategy NAME\n  \
          --min-bitscore X --max-evalue X --blast-extra-args 'ARGS'\n\n  \
  Settings are read from hcr-prober.json in the working directory unless --config is given"
    );
}

fn parse_value<T: FromStr>(flag: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| format!("Invalid value '{value}' for {flag}: {e}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

/// Flags shared by every command.
#[derive(Default)]
struct GlobalArgs {
    config: Option<PathBuf>,
    amplifiers: Option<PathBuf>,
    threads: Option<usize>,
    verbose: bool,
    json: bool,
}

#[derive(Default)]
struct CommandArgs {
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    amplifiers: Vec<String>,
    gene_name: Option<String>,
    gene_prefixes: Vec<String>,
    new_amplifier: Option<String>,
}

/// Consumes `args[*idx]`'s value, advancing the cursor.
fn take_value<'a>(args: &'a [String], idx: &mut usize, flag: &str) -> Result<&'a str, String> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {flag}"))
}

/// Consumes values up to the next flag.
fn take_values(args: &[String], idx: &mut usize, flag: &str) -> Result<Vec<String>, String> {
    let mut ret = vec![];
    while let Some(next) = args.get(*idx + 1) {
        if next.starts_with("--") {
            break;
        }
        ret.push(next.clone());
        *idx += 1;
    }
    if ret.is_empty() {
        return Err(format!("Missing value for {flag}"));
    }
    Ok(ret)
}

/// Applies one design flag to `config`. Returns false if the flag is not a design flag.
fn apply_design_flag(
    config: &mut DesignConfig,
    args: &[String],
    idx: &mut usize,
) -> Result<bool, String> {
    let flag = args[*idx].as_str();
    match flag {
        "--max-probes" => config.max_probes = parse_value(flag, take_value(args, idx, flag)?)?,
        "--skip-5prime" => config.skip_5prime = parse_value(flag, take_value(args, idx, flag)?)?,
        "--arm-len" => config.arm_len = parse_value(flag, take_value(args, idx, flag)?)?,
        "--spacer-len" => config.spacer_len = parse_value(flag, take_value(args, idx, flag)?)?,
        "--min-probe-distance" => {
            config.min_probe_distance = parse_value(flag, take_value(args, idx, flag)?)?
        }
        "--mask-sequences" => config.mask_fasta = Some(take_value(args, idx, flag)?.into()),
        "--min-gc" => config.filter.min_gc = Some(parse_value(flag, take_value(args, idx, flag)?)?),
        "--max-gc" => config.filter.max_gc = Some(parse_value(flag, take_value(args, idx, flag)?)?),
        "--min-tm" => config.filter.min_tm = Some(parse_value(flag, take_value(args, idx, flag)?)?),
        "--max-tm" => config.filter.max_tm = Some(parse_value(flag, take_value(args, idx, flag)?)?),
        "--max-homopolymer" => {
            config.filter.max_homopolymer = Some(parse_value(flag, take_value(args, idx, flag)?)?)
        }
        "--max-gc-diff" => {
            config.filter.max_gc_diff = Some(parse_value(flag, take_value(args, idx, flag)?)?)
        }
        "--blast-ref" => config.blast_ref = Some(take_value(args, idx, flag)?.into()),
        "--db-path" => config.db_path = Some(take_value(args, idx, flag)?.into()),
        "--strategy" | "--positive-selection-strategy" => {
            config.strategy = take_value(args, idx, flag)?.to_string()
        }
        "--target-transcript-id" => {
            config.target_id = Some(take_value(args, idx, flag)?.to_string())
        }
        "--common-strategy" => config.common_strategy = take_value(args, idx, flag)?.to_string(),
        "--unique-strategy" => config.unique_strategy = take_value(args, idx, flag)?.to_string(),
        "--min-bitscore" => {
            config.thresholds.min_bitscore = parse_value(flag, take_value(args, idx, flag)?)?
        }
        "--max-evalue" => {
            config.thresholds.max_evalue = parse_value(flag, take_value(args, idx, flag)?)?
        }
        "--blast-extra-args" => {
            config.blast_extra_args = take_value(args, idx, flag)?
                .split_whitespace()
                .map(str::to_string)
                .collect()
        }
        "--pool-name" => config.pool_name = Some(take_value(args, idx, flag)?.to_string()),
        "--delimiter" => config.delimiter = take_value(args, idx, flag)?.to_string(),
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_global(args: &[String]) -> Result<(GlobalArgs, usize), String> {
    let mut global = GlobalArgs::default();
    let mut idx = 1;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "--config" => global.config = Some(take_value(args, &mut idx, flag)?.into()),
            "--amplifiers" => global.amplifiers = Some(take_value(args, &mut idx, flag)?.into()),
            "--threads" => {
                global.threads = Some(parse_value(flag, take_value(args, &mut idx, flag)?)?)
            }
            "--verbose" | "-v" => global.verbose = true,
            "--json" => global.json = true,
            _ => break,
        }
        idx += 1;
    }
    Ok((global, idx))
}

fn parse_command(
    args: &[String],
    start: usize,
    config: &mut DesignConfig,
) -> Result<CommandArgs, String> {
    let mut cmd = CommandArgs::default();
    let mut idx = start;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "-i" | "--input" => cmd.input = Some(take_value(args, &mut idx, flag)?.into()),
            "--input-probes" => cmd.input = Some(take_value(args, &mut idx, flag)?.into()),
            "-o" | "--output-dir" => {
                cmd.output_dir = Some(take_value(args, &mut idx, flag)?.into())
            }
            "--amplifier" => cmd.amplifiers = take_values(args, &mut idx, flag)?,
            "--gene-name" => cmd.gene_name = Some(take_value(args, &mut idx, flag)?.to_string()),
            "--gene-prefix" => cmd.gene_prefixes = take_values(args, &mut idx, flag)?,
            "--new-amplifier" => {
                cmd.new_amplifier = Some(take_value(args, &mut idx, flag)?.to_string())
            }
            _ => {
                if !apply_design_flag(config, args, &mut idx)? {
                    usage();
                    return Err(format!("Unknown argument '{flag}'"));
                }
            }
        }
        idx += 1;
    }
    Ok(cmd)
}

fn load_amplifier_set(path: Option<&Path>) -> Result<AmplifierSet, String> {
    match path {
        Some(path) => load_amplifiers(path),
        None => builtin_amplifiers(),
    }
    .map_err(|e| e.to_string())
}

/// Prepares the BLAST database once, before any unit runs.
fn prepare_reference(config: &DesignConfig) -> Result<(BlastAligner, ReferenceSet), String> {
    let aligner = BlastAligner::new(config.blast_extra_args.clone());
    let Some(blast_ref) = &config.blast_ref else {
        warn!("No --blast-ref given, specificity screening is disabled");
        return Ok((aligner, ReferenceSet::default()));
    };
    aligner.check_available().map_err(|e| e.to_string())?;
    info!("Dependency check passed: NCBI BLAST+ found");
    let db = create_blast_db(blast_ref, config.db_path.as_deref()).map_err(|e| e.to_string())?;
    Ok((aligner, ReferenceSet::database(db)))
}

#[derive(Serialize)]
struct JobSummary {
    job: String,
    ok: bool,
    probes: usize,
    error: Option<String>,
}

fn summarize(results: &[UnitResult<usize>]) -> Vec<JobSummary> {
    results
        .iter()
        .map(|r| JobSummary {
            job: r.name.clone(),
            ok: r.result.is_ok(),
            probes: r.result.as_ref().copied().unwrap_or(0),
            error: r.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect()
}

fn finish(results: Vec<UnitResult<usize>>, json: bool) -> Result<(), String> {
    let summary = summarize(&results);
    if json {
        print_json(&summary)?;
    }
    let failed = summary.iter().filter(|s| !s.ok).count();
    if failed > 0 {
        return Err(format!("{failed} of {} job(s) failed", summary.len()));
    }
    info!("HCR-prober pipeline finished");
    Ok(())
}

fn write_outcome(
    base: &Path,
    unit: &str,
    amplifier_name: &str,
    amplifiers: &AmplifierSet,
    outcome: &DesignOutcome,
    config: &DesignConfig,
) -> hcr_prober::error::Result<usize> {
    let amplifier = amplifiers.get(amplifier_name).ok_or_else(|| {
        hcr_prober::error::ProberError::invalid_config(format!(
            "Amplifier '{amplifier_name}' not found"
        ))
    })?;
    write_unit(
        base,
        &UnitReport {
            unit,
            amplifier_name,
            amplifier,
            outcome,
            config,
        },
    )?;
    Ok(outcome.probes.len())
}

fn run_design(
    config: &DesignConfig,
    cmd: &CommandArgs,
    amplifiers: &AmplifierSet,
    json: bool,
) -> Result<(), String> {
    let input = cmd.input.as_deref().ok_or("design needs -i FASTA")?;
    let pipeline = config.pipeline().map_err(|e| e.to_string())?;
    let transcripts: Vec<Transcript> = read_transcripts(input)
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|t| cmd.gene_name.as_deref().is_none_or(|name| t.id() == name))
        .collect();
    if transcripts.is_empty() {
        return Err(format!(
            "No sequences found in '{}' that match --gene-name '{}'",
            input.display(),
            cmd.gene_name.as_deref().unwrap_or_default()
        ));
    }

    let (aligner, reference) = prepare_reference(config)?;
    let strategy = config.selection_strategy().map_err(|e| e.to_string())?;
    let base = cmd.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());

    let units: Vec<(&Transcript, &String)> = transcripts
        .iter()
        .flat_map(|t| cmd.amplifiers.iter().map(move |a| (t, a)))
        .collect();
    let results = run_units(
        &units,
        |(t, a)| format!("{}-{a}", t.id()),
        |(t, a)| {
            let outcome = pipeline.run(
                t,
                Some(Specificity {
                    aligner: &aligner,
                    reference: &reference,
                    strategy: &strategy,
                }),
            )?;
            write_outcome(&base, t.id(), a, amplifiers, &outcome, config)
        },
    );
    finish(results, json)
}

fn run_isoform_split(
    config: &DesignConfig,
    cmd: &CommandArgs,
    amplifiers: &AmplifierSet,
    json: bool,
) -> Result<(), String> {
    let input = cmd.input.as_deref().ok_or("isoform-split needs -i FASTA")?;
    if cmd.gene_prefixes.is_empty() {
        return Err("isoform-split needs --gene-prefix".to_string());
    }
    let partitioner = config.partitioner().map_err(|e| e.to_string())?;
    let groups = group_by_prefix(read_transcripts(input).map_err(|e| e.to_string())?, &config.delimiter);
    let (aligner, reference) = prepare_reference(config)?;
    let aligner: Option<&dyn Aligner> = Some(&aligner);
    let base = cmd.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());

    let mut units = vec![];
    for prefix in &cmd.gene_prefixes {
        match groups.get(prefix) {
            Some(group) => units.extend(cmd.amplifiers.iter().map(|a| (group, a))),
            None => warn!("Gene prefix '{prefix}' not found, skipping"),
        }
    }
    let results = run_units(
        &units,
        |(g, a)| format!("{}-{a}", g.gene),
        |(group, a)| {
            let outcome = partitioner.run(group, aligner, &reference)?;
            let gene_dir = base.join(&group.gene);
            let mut probes = write_outcome(
                &gene_dir.join("common_probes"),
                &format!("{}_common", group.gene),
                a,
                amplifiers,
                &outcome.common,
                config,
            )?;
            for unique in &outcome.unique {
                probes += write_outcome(
                    &gene_dir.join("isoform_specific_probes"),
                    &unique.transcript_id,
                    a,
                    amplifiers,
                    unique,
                    config,
                )?;
            }
            Ok(probes)
        },
    );
    finish(results, json)
}

fn run_swap(cmd: &CommandArgs, amplifiers: &AmplifierSet, json: bool) -> Result<(), String> {
    let input = cmd.input.as_deref().ok_or("swap needs --input-probes PATH")?;
    let new_amp = cmd.new_amplifier.as_deref().ok_or("swap needs --new-amplifier NAME")?;
    let out = cmd
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("swapped_probes"));
    let written = swap_path(input, &out, amplifiers, new_amp).map_err(|e| e.to_string())?;
    if json {
        print_json(&written)?;
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return Ok(());
    }

    let (global, cmd_idx) = parse_global(&args)?;
    let level = if global.verbose { Level::Debug } else { Level::Info };
    simple_logger::init_with_level(level).map_err(|e| format!("Could not start logger: {e}"))?;

    let Some(command) = args.get(cmd_idx) else {
        usage();
        return Err("Missing command".to_string());
    };

    let mut config = DesignConfig::load(global.config.as_deref()).map_err(|e| e.to_string())?;
    if global.amplifiers.is_some() {
        config.amplifiers = global.amplifiers.clone();
    }
    if global.threads.is_some() {
        config.threads = global.threads;
    }
    let cmd = parse_command(&args, cmd_idx + 1, &mut config)?;
    configure_threads(config.threads).map_err(|e| e.to_string())?;
    let amplifiers = load_amplifier_set(config.amplifiers.as_deref())?;

    match command.as_str() {
        "design" | "isoform-split" => {
            if cmd.amplifiers.is_empty() {
                usage();
                return Err(format!("{command} needs --amplifier"));
            }
            config.validate().map_err(|e| e.to_string())?;
            require_known(&amplifiers, &cmd.amplifiers).map_err(|e| e.to_string())?;
            if command == "design" {
                run_design(&config, &cmd, &amplifiers, global.json)
            } else {
                run_isoform_split(&config, &cmd, &amplifiers, global.json)
            }
        }
        "swap" => run_swap(&cmd, &amplifiers, global.json),
        other => {
            usage();
            Err(format!("Unknown command '{other}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_global_flags_stop_at_command() {
        let args = argv("hcr_prober --threads 4 --verbose design -i a.fa");
        let (global, idx) = parse_global(&args).unwrap();
        assert_eq!(global.threads, Some(4));
        assert!(global.verbose);
        assert_eq!(args[idx], "design");
    }

    #[test]
    fn test_design_flags_override_config() {
        let args = argv(
            "hcr_prober design -i a.fa --amplifier B1 B3 --max-probes 10 --min-gc 40 \
             --strategy best-coverage --blast-extra-args -word_size_7_-dust_no --gene-name ACTB",
        );
        let mut config = DesignConfig::default();
        let cmd = parse_command(&args, 2, &mut config).unwrap();
        assert_eq!(cmd.input, Some(PathBuf::from("a.fa")));
        assert_eq!(cmd.amplifiers, vec!["B1", "B3"]);
        assert_eq!(cmd.gene_name.as_deref(), Some("ACTB"));
        assert_eq!(config.max_probes, 10);
        assert_eq!(config.filter.min_gc, Some(40.0));
        assert_eq!(config.strategy, "best-coverage");
        assert_eq!(config.blast_extra_args, vec!["-word_size_7_-dust_no"]);
    }

    #[test]
    fn test_multi_value_flag_needs_a_value() {
        let args = argv("hcr_prober design --amplifier --max-probes 3");
        let mut config = DesignConfig::default();
        assert!(parse_command(&args, 2, &mut config).is_err());
    }

    #[test]
    fn test_bad_number_is_reported() {
        let args = argv("hcr_prober design --max-probes many");
        let mut config = DesignConfig::default();
        let err = parse_command(&args, 2, &mut config).err().unwrap();
        assert!(err.contains("--max-probes"));
    }
}
