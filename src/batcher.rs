use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::domain::AccessionGroups;
use crate::error::PipelineError;
use crate::fs_util;

pub const BATCH_PAD_WIDTH: usize = 6;
pub const BATCH_DIR_DEPTH: usize = 3;
pub const BATCH_SUFFIX: &str = "accessions.json";
pub const SUMMARY_HEADER: &str = "batch\tuniq_pub_count\tuniq_acc_count\tuniq_pub_acc_combo";

pub fn hashed_path(
    root: &Utf8Path,
    prefix: &str,
    index: usize,
    width: usize,
    depth: usize,
    suffix: &str,
) -> Utf8PathBuf {
    let padded = format!("{index:0width$}");
    let mut dir = root.to_owned();
    for level in padded.chars().rev().take(depth) {
        dir.push(level.to_string());
    }
    dir.join(format!("{prefix}_{padded}.{suffix}"))
}

#[derive(Debug, Clone)]
pub struct Batcher {
    outdir: Utf8PathBuf,
    prefix: String,
    batch_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub file: String,
    pub path: String,
    pub publications: usize,
    pub accessions: usize,
    pub links: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub publications: usize,
    pub batches: Vec<BatchEntry>,
    pub summary_path: String,
}

impl Batcher {
    pub fn new(outdir: Utf8PathBuf, prefix: String, batch_size: usize) -> Self {
        Self {
            outdir,
            prefix,
            batch_size,
        }
    }

    pub fn batch_path(&self, index: usize) -> Utf8PathBuf {
        hashed_path(
            &self.outdir,
            &self.prefix,
            index,
            BATCH_PAD_WIDTH,
            BATCH_DIR_DEPTH,
            BATCH_SUFFIX,
        )
    }

    pub fn summary_path(&self) -> Utf8PathBuf {
        self.outdir.join(format!("{}.summary.tsv", self.prefix))
    }

    pub fn write_batches(&self, groups: &AccessionGroups) -> Result<BatchReport, PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }
        fs_util::ensure_dir(&self.outdir)?;

        let entries: Vec<(&String, &Vec<String>)> = groups.iter().collect();
        let mut summary = String::new();
        summary.push_str(SUMMARY_HEADER);
        summary.push('\n');

        let mut batches = Vec::new();
        for (chunk_index, chunk) in entries.chunks(self.batch_size).enumerate() {
            let index = chunk_index + 1;
            let path = self.batch_path(index);
            let batch: AccessionGroups = chunk
                .iter()
                .map(|(id, accessions)| ((*id).clone(), (*accessions).clone()))
                .collect();
            fs_util::write_json_atomic(&path, &batch)?;

            let file = path.file_name().unwrap_or_default().to_string();
            let accessions: BTreeSet<&str> = chunk
                .iter()
                .flat_map(|(_, list)| list.iter().map(String::as_str))
                .collect();
            let links: usize = chunk.iter().map(|(_, list)| list.len()).sum();
            summary.push_str(&format!(
                "{file}\t{}\t{}\t{links}\n",
                chunk.len(),
                accessions.len()
            ));
            info!("wrote batch {index} ({} publications) to {path}", chunk.len());

            batches.push(BatchEntry {
                file,
                path: path.into_string(),
                publications: chunk.len(),
                accessions: accessions.len(),
                links,
            });
        }

        let summary_path = self.summary_path();
        fs_util::write_bytes_atomic(&summary_path, summary.as_bytes())?;

        Ok(BatchReport {
            publications: groups.len(),
            batches,
            summary_path: summary_path.into_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_path_reverses_padded_index() {
        let root = Utf8Path::new("/data/results");
        let path = hashed_path(root, "split", 1, 6, 3, "accessions.json");
        assert_eq!(path, "/data/results/1/0/0/split_000001.accessions.json");

        let path = hashed_path(root, "split", 123456, 6, 3, "accessions.json");
        assert_eq!(path, "/data/results/6/5/4/split_123456.accessions.json");
    }

    #[test]
    fn hashed_path_wider_layout() {
        let root = Utf8Path::new("corpus");
        let path = hashed_path(root, "epmc", 42, 8, 4, "page.json");
        assert_eq!(path, "corpus/2/4/0/0/epmc_00000042.page.json");
    }

    #[test]
    fn batch_and_summary_paths() {
        let batcher = Batcher::new(Utf8PathBuf::from("out"), "split".to_string(), 250);
        assert_eq!(batcher.batch_path(7), "out/7/0/0/split_000007.accessions.json");
        assert_eq!(batcher.summary_path(), "out/split.summary.tsv");
    }
}
