use std::error::Error;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::bail;
use bio::alphabets;
use bio::io::fasta::{Reader, Record};
use hashbrown::HashSet;
use log::info;
use tempfile::NamedTempFile;

use crate::alignment::{Alignment, GAP, POSSIBLE_GAPS};
use crate::tree::{tree_parser, Tree};
use crate::Result;

pub(crate) struct DataError {
    pub(crate) message: String,
}
impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for DataError {}

/// Reads a protein multiple-sequence alignment from a fasta file.
/// Sequences are converted to uppercase and alternative gap symbols are
/// normalized to `-`; taxon ids must be unique within the file.
///
/// # Arguments
/// * `path` - Path to the fasta file.
///
/// # Example
/// ```
/// use njtrees::io::read_alignment;
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("cluster.fasta");
/// std::fs::write(&path, ">A\nMKV-\n>B\nmkvl\n").unwrap();
/// let alignment = read_alignment(&path).unwrap();
/// # assert_eq!(alignment.len(), 2);
/// # assert_eq!(alignment.record(1).seq(), b"MKVL");
/// ```
pub fn read_alignment(path: &Path) -> Result<Alignment> {
    info!("Reading alignment from file {}", path.display());
    let reader = Reader::from_file(path)?;
    let alphabet = protein_alphabet();
    let mut ids = HashSet::new();
    let mut records = Vec::new();

    for result in reader.records() {
        let rec = result?;
        if let Err(e) = rec.check() {
            bail!(DataError {
                message: e.to_string()
            });
        }
        let seq: Vec<u8> = rec
            .seq()
            .to_ascii_uppercase()
            .iter()
            .map(|c| if POSSIBLE_GAPS.contains(c) { GAP } else { *c })
            .collect();

        if !alphabet.is_word(&seq) {
            bail!(DataError {
                message: format!("Invalid protein sequence encountered for {}", rec.id())
            });
        }
        if !ids.insert(rec.id().to_string()) {
            bail!(DataError {
                message: format!("Duplicate taxon id {} in alignment", rec.id())
            });
        }

        records.push(Record::with_attrs(rec.id(), rec.desc(), &seq));
    }
    if records.is_empty() {
        bail!(DataError {
            message: String::from("No sequences found in file")
        });
    }

    info!("Read {} sequences successfully", records.len());
    Ok(Alignment::new(records))
}

fn protein_alphabet() -> alphabets::Alphabet {
    let mut alphabet = alphabets::protein::iupac_alphabet();
    alphabet.insert(GAP);
    alphabet
}

/// Reads newick trees from a file, returning a vector of trees.
/// Multifurcations are kept as found, including trifurcating roots.
///
/// # Arguments
/// * `path` - Path to the newick file.
pub fn read_newick_from_file(path: &Path) -> Result<Vec<Tree>> {
    info!("Reading newick trees from file {}", path.display());
    let newick = fs::read_to_string(path)?;
    tree_parser::from_newick(&newick)
}

/// Writes newick trees to the given file path, one tree per line.
/// The content is written to a temporary file in the destination directory
/// and renamed into place, so the target is never partially written;
/// an existing file is replaced.
///
/// # Arguments
/// * `trees` - Trees to serialize.
/// * `path` - Path to the newick file.
///
/// # Example
/// ```
/// use njtrees::io::{read_newick_from_file, write_newick_to_file};
/// use njtrees::tree::tree_parser::from_newick;
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("out.nwk");
/// let trees = from_newick("((A:1.0,B:2.0)Inner1:1.0,C:4.0)Inner2:0.0;").unwrap();
/// write_newick_to_file(&trees, &path).unwrap();
/// # assert_eq!(read_newick_from_file(&path).unwrap().len(), 1);
/// ```
pub fn write_newick_to_file(trees: &[Tree], path: &Path) -> Result<()> {
    info!("Writing newick trees to file {}", path.display());
    write_atomic(path, |writer| {
        for tree in trees {
            writer.write_all(tree.to_newick().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    })
}

/// Writes to a temporary sibling file, then renames it onto `path`.
pub(crate) fn write_atomic(
    path: &Path,
    fill: impl FnOnce(&mut NamedTempFile) -> Result<()>,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if parent != Path::new("") => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    fill(&mut tmp)?;
    tmp.persist(path)?;
    Ok(())
}
