use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use crate::pipeline::{
    aggregate_trees, process_cluster, reduce_topologies, run, ClusterStatus, Config, RunSummary,
};

fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) {
    let content: String = records
        .iter()
        .map(|(id, seq)| format!(">{}\n{}\n", id, seq))
        .collect();
    fs::write(dir.join(name), content).unwrap();
}

fn config(input: &Path, output: &Path, bootstrap: Option<f64>) -> Config {
    Config {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        bootstrap,
        seed: Some(42),
    }
}

fn four_taxon_records(block: &'static str) -> Vec<(&'static str, &'static str)> {
    match block {
        "one" => vec![
            ("S1", "MKVLMKVL"),
            ("S2", "MKVLMKVL"),
            ("S3", "MKVLRRRR"),
            ("S4", "MKVLRRRR"),
        ],
        "two" => vec![
            ("S1", "AAAAMMMM"),
            ("S2", "AAAAMMMK"),
            ("S3", "AAAARRRR"),
            ("S4", "AAAARRRS"),
        ],
        _ => vec![
            ("S1", "MMMMMMMM"),
            ("S2", "MMMMMMMM"),
            ("S3", "MMMMMMMM"),
            ("S4", "MMMMMMMM"),
        ],
    }
}

// 10 short gapped sequences whose identity distances drive one NJ branch
// length below zero, so the reconstruction is discarded as degenerate.
fn degenerate_records() -> Vec<(&'static str, &'static str)> {
    vec![
        ("T0", "-MK"),
        ("T1", "--M"),
        ("T2", "MM-"),
        ("T3", "MMK"),
        ("T4", "-MM"),
        ("T5", "--K"),
        ("T6", "-MM"),
        ("T7", "KMM"),
        ("T8", "KK-"),
        ("T9", "MKK"),
    ]
}

// Half the columns support the split S1S2|S3S4, half support S1S3|S2S4;
// replicates disagree, so the average support stays below 100.
fn conflicting_records() -> Vec<(&'static str, &'static str)> {
    vec![
        ("S1", "MMMMMMMMMMMM"),
        ("S2", "MMMMMMKKKKKK"),
        ("S3", "KKKKKKMMMMMM"),
        ("S4", "KKKKKKKKKKKK"),
    ]
}

#[test]
fn cluster_statuses_map_every_outcome() {
    let input = tempdir().unwrap();
    let trees = tempdir().unwrap();
    write_fasta(input.path(), "good.fasta", &four_taxon_records("one"));
    write_fasta(input.path(), "single.fasta", &[("A", "MKVL")]);
    write_fasta(input.path(), "warped.fasta", &degenerate_records());

    let mut rng = StdRng::seed_from_u64(0);
    let good = input.path().join("good.fasta");
    assert_matches!(
        process_cluster(&good, trees.path(), None, &mut rng),
        ClusterStatus::Accepted
    );
    let single = input.path().join("single.fasta");
    assert_matches!(
        process_cluster(&single, trees.path(), None, &mut rng),
        ClusterStatus::Invalid
    );
    let warped = input.path().join("warped.fasta");
    assert_matches!(
        process_cluster(&warped, trees.path(), None, &mut rng),
        ClusterStatus::Degenerate
    );
}

#[test]
fn run_accepts_all_valid_clusters() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(input.path(), "cluster1.fasta", &four_taxon_records("one"));
    write_fasta(input.path(), "cluster2.fasta", &four_taxon_records("two"));
    write_fasta(input.path(), "cluster3.fasta", &four_taxon_records("three"));

    let summary = run(&config(input.path(), output.path(), None)).unwrap();
    assert_eq!(
        summary,
        RunSummary {
            accepted: 3,
            ..Default::default()
        }
    );

    for name in ["cluster1.nwk", "cluster2.nwk", "cluster3.nwk"] {
        assert!(output.path().join("nj_trees").join(name).exists());
    }
    let consolidated = fs::read_to_string(output.path().join("nj_trees.nwk")).unwrap();
    assert_eq!(consolidated.lines().count(), 3);
    let reduced = fs::read_to_string(output.path().join("nj_trees_length_less.nwk")).unwrap();
    assert_eq!(reduced.lines().count(), 3);
    assert!(!reduced.contains(':'));
    assert!(!reduced.contains("Inner"));
    for line in reduced.lines() {
        assert!(line.ends_with(';'));
    }
}

#[test]
fn run_discards_degenerate_cluster() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(input.path(), "good.fasta", &four_taxon_records("one"));
    write_fasta(input.path(), "warped.fasta", &degenerate_records());

    let summary = run(&config(input.path(), output.path(), None)).unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.degenerate, 1);
    assert!(!output.path().join("nj_trees").join("warped.nwk").exists());
    let consolidated = fs::read_to_string(output.path().join("nj_trees.nwk")).unwrap();
    assert_eq!(consolidated.lines().count(), 1);
}

#[test]
fn run_skips_invalid_clusters() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(input.path(), "single.fasta", &[("A", "MKVL")]);
    write_fasta(
        input.path(),
        "ragged.fasta",
        &[("A", "MKVL"), ("B", "MKVLRS")],
    );
    fs::write(input.path().join("notes.txt"), "not an alignment").unwrap();

    let summary = run(&config(input.path(), output.path(), None)).unwrap();
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.invalid, 2);
    let consolidated = fs::read_to_string(output.path().join("nj_trees.nwk")).unwrap();
    assert!(consolidated.is_empty());
}

#[test]
fn run_accepts_two_taxa_under_bootstrap_gate() {
    // The root is the only internal clade and matches in every replicate,
    // so a two-taxon cluster passes any threshold.
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(
        input.path(),
        "pair.fasta",
        &[("A", "MKVLMKVL"), ("B", "MKVLMKVI")],
    );

    let summary = run(&config(input.path(), output.path(), Some(80.0))).unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.bootstrap_rejected, 0);
    assert!(output.path().join("nj_trees").join("pair.nwk").exists());
}

#[test]
fn run_rejects_conflicting_cluster_under_strict_gate() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(input.path(), "conflict.fasta", &conflicting_records());

    let summary = run(&config(input.path(), output.path(), Some(100.0))).unwrap();
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.bootstrap_rejected, 1);
    assert!(!output.path().join("nj_trees").join("conflict.nwk").exists());
}

#[test]
fn run_on_empty_input_writes_empty_outputs() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    let summary = run(&config(input.path(), output.path(), None)).unwrap();
    assert_eq!(summary, RunSummary::default());
    assert!(output.path().join("nj_trees.nwk").exists());
    assert!(output.path().join("nj_trees_length_less.nwk").exists());
}

#[test]
fn rerun_overwrites_previous_outputs() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_fasta(input.path(), "cluster1.fasta", &four_taxon_records("one"));

    run(&config(input.path(), output.path(), None)).unwrap();
    run(&config(input.path(), output.path(), None)).unwrap();
    let consolidated = fs::read_to_string(output.path().join("nj_trees.nwk")).unwrap();
    assert_eq!(consolidated.lines().count(), 1);
}

#[test]
fn aggregation_strips_duplicate_markers() {
    let dir = tempdir().unwrap();
    let trees_dir = dir.path().join("nj_trees");
    fs::create_dir(&trees_dir).unwrap();
    fs::write(
        trees_dir.join("b.nwk"),
        "((sp1:0.1,sp1$:0.1)Inner1:0.0,sp2:0.2)Inner2:0.0;\n",
    )
    .unwrap();
    fs::write(trees_dir.join("a.nwk"), "(sp1:0.1,sp3:0.1)Inner1:0.0;\n").unwrap();

    let output = dir.path().join("nj_trees.nwk");
    let lines = aggregate_trees(&trees_dir, &output).unwrap();
    assert_eq!(lines, 2);
    let content = fs::read_to_string(&output).unwrap();
    assert!(!content.contains('$'));
    // Sorted directory order, not creation order.
    assert!(content.starts_with("(sp1:0.1,sp3:0.1)"));
    assert!(content.contains("((sp1:0.1,sp1:0.1)"));
}

#[test]
fn aggregation_fails_without_trees_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nj_trees");
    let res = aggregate_trees(&missing, &dir.path().join("nj_trees.nwk"));
    assert!(res.is_err());
    assert!(res.unwrap_err().to_string().contains("does not exist"));
}

#[test]
fn reduction_strips_lengths_and_inner_labels() {
    let dir = tempdir().unwrap();
    let consolidated = dir.path().join("nj_trees.nwk");
    fs::write(
        &consolidated,
        "((sp1:0.12,sp2:0.3)Inner1:0.0,sp3:1.5)Inner2:0.0;\n",
    )
    .unwrap();
    let output = dir.path().join("reduced.nwk");
    reduce_topologies(&consolidated, &output).unwrap();
    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(content, "((sp1,sp2),sp3);\n");
}

#[test]
fn reduction_keeps_taxon_labels_containing_marker_text() {
    let dir = tempdir().unwrap();
    let consolidated = dir.path().join("nj_trees.nwk");
    fs::write(
        &consolidated,
        "((Inner1X:0.1,sp2:0.2)Inner1:0.0,sp3:0.3)Inner2:0.0;\n",
    )
    .unwrap();
    let output = dir.path().join("reduced.nwk");
    reduce_topologies(&consolidated, &output).unwrap();
    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(content, "((Inner1X,sp2),sp3);\n");
}

#[test]
fn reduction_handles_negative_branch_lengths() {
    let dir = tempdir().unwrap();
    let consolidated = dir.path().join("nj_trees.nwk");
    fs::write(&consolidated, "(sp1:-0.1,sp2:0.2)Inner1:0.0;\n").unwrap();
    let output = dir.path().join("reduced.nwk");
    reduce_topologies(&consolidated, &output).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), "(sp1,sp2);\n");
}

#[test]
fn reduction_is_idempotent() {
    let dir = tempdir().unwrap();
    let consolidated = dir.path().join("nj_trees.nwk");
    fs::write(
        &consolidated,
        "((sp1:0.12,sp2:0.3)Inner1:0.0,sp3:1.5)Inner2:0.0;\n",
    )
    .unwrap();
    let once = dir.path().join("once.nwk");
    let twice = dir.path().join("twice.nwk");
    reduce_topologies(&consolidated, &once).unwrap();
    reduce_topologies(&once, &twice).unwrap();
    assert_eq!(
        fs::read_to_string(&once).unwrap(),
        fs::read_to_string(&twice).unwrap()
    );
}

#[test]
fn reduction_fails_without_consolidated_file() {
    let dir = tempdir().unwrap();
    let res = reduce_topologies(
        &dir.path().join("missing.nwk"),
        &dir.path().join("reduced.nwk"),
    );
    assert!(res.is_err());
}

#[test]
fn summary_reports_all_counters() {
    let summary = RunSummary {
        accepted: 3,
        invalid: 1,
        degenerate: 2,
        bootstrap_rejected: 4,
    };
    let text = summary.to_string();
    assert!(text.contains("3 cluster(s) accepted"));
    assert!(text.contains("1 invalid"));
    assert!(text.contains("2 degenerate"));
    assert!(text.contains("4 rejected by bootstrap"));
}
