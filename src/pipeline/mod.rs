use std::error::Error;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::bail;
use lazy_static::lazy_static;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use regex::Regex;

use crate::bootstrap;
use crate::io::{read_alignment, write_atomic, write_newick_to_file};
use crate::tree::nj_builder::build_nj_tree;
use crate::tree::INNER_LABEL_PREFIX;
use crate::Result;

/// Marker appended upstream to taxon labels that would otherwise repeat
/// within a cluster; stripped during aggregation.
pub(crate) const DUPLICATE_MARKER: char = '$';

/// Subdirectory of the output directory holding one newick file per
/// accepted cluster.
pub(crate) const TREES_SUBDIR: &str = "nj_trees";

pub(crate) struct AggregationError {
    pub(crate) message: String,
}
impl fmt::Debug for AggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for AggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for AggregationError {}

/// Run configuration for one pass over a directory of cluster alignments.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Bootstrap acceptance threshold in [0, 100]; `None` disables the gate.
    pub bootstrap: Option<f64>,
    /// Seed for reproducible bootstrap resampling; entropy-seeded if absent.
    pub seed: Option<u64>,
}

/// Per-cluster outcome; every input file ends up in exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    /// Tree built, validated and written.
    Accepted,
    /// Unreadable or malformed alignment, cluster skipped.
    Invalid,
    /// NJ produced a negative branch length, tree discarded.
    Degenerate,
    /// Average bootstrap confidence fell below the threshold.
    BootstrapRejected,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub accepted: usize,
    pub invalid: usize,
    pub degenerate: usize,
    pub bootstrap_rejected: usize,
}

impl RunSummary {
    fn tally(statuses: &[ClusterStatus]) -> RunSummary {
        let mut summary = RunSummary::default();
        for status in statuses {
            match status {
                ClusterStatus::Accepted => summary.accepted += 1,
                ClusterStatus::Invalid => summary.invalid += 1,
                ClusterStatus::Degenerate => summary.degenerate += 1,
                ClusterStatus::BootstrapRejected => summary.bootstrap_rejected += 1,
            }
        }
        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cluster(s) accepted, {} invalid, {} degenerate, {} rejected by bootstrap",
            self.accepted, self.invalid, self.degenerate, self.bootstrap_rejected
        )
    }
}

/// Runs the whole stage: builds one NJ tree per `.fasta` alignment in the
/// input directory on a worker pool, writes accepted trees under
/// `<output_dir>/nj_trees/`, then aggregates them into `nj_trees.nwk` and
/// derives the length-less `nj_trees_length_less.nwk` for the supertree
/// tool. Per-cluster failures are isolated and counted; aggregation
/// failures abort the run.
pub fn run(config: &Config) -> Result<RunSummary> {
    let trees_dir = config.output_dir.join(TREES_SUBDIR);
    fs::create_dir_all(&trees_dir)?;

    let inputs = input_files(&config.input_dir)?;
    if inputs.is_empty() {
        warn!(
            "No .fasta alignments found in {}",
            config.input_dir.display()
        );
    }

    let workers = std::cmp::max(1, num_cpus::get() * 3 / 4);
    info!(
        "Processing {} cluster(s) on {} worker(s)",
        inputs.len(),
        workers
    );
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let statuses: Vec<ClusterStatus> = pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(task, input)| {
                let mut rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(task as u64)),
                    None => StdRng::from_entropy(),
                };
                process_cluster(input, &trees_dir, config.bootstrap, &mut rng)
            })
            .collect()
    });
    let summary = RunSummary::tally(&statuses);

    let consolidated = config.output_dir.join("nj_trees.nwk");
    let lines = aggregate_trees(&trees_dir, &consolidated)?;
    info!("Aggregated {} tree(s) into {}", lines, consolidated.display());
    let reduced = config.output_dir.join("nj_trees_length_less.nwk");
    reduce_topologies(&consolidated, &reduced)?;
    Ok(summary)
}

/// The `.fasta` files of the input directory, sorted for a deterministic
/// task order.
fn input_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "fasta") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Handles one cluster end-to-end: read the alignment, gate on bootstrap
/// confidence when a threshold is set, build and validate the NJ tree, and
/// write it as `<stem>.nwk`. Never fails the run; every outcome maps to a
/// [`ClusterStatus`].
pub(crate) fn process_cluster(
    input: &Path,
    trees_dir: &Path,
    threshold: Option<f64>,
    rng: &mut StdRng,
) -> ClusterStatus {
    let alignment = match read_alignment(input) {
        Ok(alignment) => alignment,
        Err(e) => {
            warn!("Skipping {}: {}", input.display(), e);
            return ClusterStatus::Invalid;
        }
    };
    if let Some(threshold) = threshold {
        match bootstrap::average_support(&alignment, rng) {
            Ok(average) if average >= threshold => {}
            Ok(average) => {
                info!(
                    "Rejecting {}: average support {:.2} below threshold {:.2}",
                    input.display(),
                    average,
                    threshold
                );
                return ClusterStatus::BootstrapRejected;
            }
            Err(e) => {
                warn!("Skipping {}: {}", input.display(), e);
                return ClusterStatus::Invalid;
            }
        }
    }
    let tree = match build_nj_tree(&alignment) {
        Ok(tree) => tree,
        Err(e) => {
            warn!("Skipping {}: {}", input.display(), e);
            return ClusterStatus::Invalid;
        }
    };
    if !tree.is_valid() {
        info!(
            "Discarding {}: reconstruction produced a negative branch length",
            input.display()
        );
        return ClusterStatus::Degenerate;
    }
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = trees_dir.join(format!("{}.nwk", stem));
    match write_newick_to_file(&[tree], &output) {
        Ok(()) => ClusterStatus::Accepted,
        Err(e) => {
            warn!("Failed to write {}: {}", output.display(), e);
            ClusterStatus::Invalid
        }
    }
}

/// Concatenates every per-cluster `.nwk` file in sorted directory order
/// into one consolidated file, one newline-terminated tree per line, with
/// all duplicate-disambiguation `$` markers removed. Returns the number of
/// lines written. A missing or unreadable trees directory is fatal.
pub(crate) fn aggregate_trees(trees_dir: &Path, output: &Path) -> Result<usize> {
    if !trees_dir.is_dir() {
        bail!(AggregationError {
            message: format!("Tree directory {} does not exist", trees_dir.display())
        });
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(trees_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "nwk") {
            files.push(path);
        }
    }
    files.sort();

    let mut lines = 0;
    write_atomic(output, |writer| {
        for file in &files {
            let content = fs::read_to_string(file)?;
            for line in content.lines().filter(|line| !line.trim().is_empty()) {
                let stripped: String = line
                    .chars()
                    .filter(|c| *c != DUPLICATE_MARKER)
                    .collect();
                writer.write_all(stripped.as_bytes())?;
                writer.write_all(b"\n")?;
                lines += 1;
            }
        }
        Ok(())
    })?;
    Ok(lines)
}

lazy_static! {
    static ref BRANCH_LENGTH_RE: Regex = Regex::new(r":-?[\d.]+").unwrap();
    static ref INNER_LABEL_RE: Regex =
        Regex::new(&format!(r"\){}\d*", INNER_LABEL_PREFIX)).unwrap();
}

/// Rewrites the consolidated tree file into the branch-length-free,
/// internal-label-free format the supertree tool requires. Internal labels
/// are only removed where they directly follow a closing parenthesis, so
/// taxon labels containing the same text survive. Line count and grouping
/// syntax are preserved; the transform is idempotent on its own output.
pub(crate) fn reduce_topologies(consolidated: &Path, output: &Path) -> Result<()> {
    let content = match fs::read_to_string(consolidated) {
        Ok(content) => content,
        Err(e) => bail!(AggregationError {
            message: format!("Cannot read {}: {}", consolidated.display(), e)
        }),
    };
    write_atomic(output, |writer| {
        for line in content.lines() {
            let lengthless = BRANCH_LENGTH_RE.replace_all(line, "");
            let reduced = INNER_LABEL_RE.replace_all(&lengthless, ")");
            writer.write_all(reduced.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    })
}

#[cfg(test)]
#[cfg_attr(coverage, coverage(off))]
mod tests;
