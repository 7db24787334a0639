use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::batcher;
use crate::epmc::{self, EpmcClient, EpmcTransport, OnFailure};
use crate::error::PipelineError;
use crate::fs_util;

pub const PAGE_PAD_WIDTH: usize = 8;
pub const PAGE_DIR_DEPTH: usize = 4;
pub const PAGE_SUFFIX: &str = "page.json";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const START_CURSOR: &str = "*";

pub fn type_query(keys: &[String]) -> String {
    let clauses: Vec<String> = keys
        .iter()
        .map(|key| format!("ACCESSION_TYPE:\"{key}\""))
        .collect();
    clauses.join(" OR ")
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub pages: usize,
    pub records: usize,
    pub completed: bool,
    pub next_cursor: Option<String>,
    pub next_index: usize,
}

pub struct CursorFetcher<'a, T: EpmcTransport> {
    client: &'a EpmcClient<T>,
    outdir: Utf8PathBuf,
    prefix: String,
    page_size: usize,
    limit: Option<u64>,
}

impl<'a, T: EpmcTransport> CursorFetcher<'a, T> {
    pub fn new(
        client: &'a EpmcClient<T>,
        outdir: Utf8PathBuf,
        prefix: String,
        page_size: usize,
    ) -> Self {
        Self {
            client,
            outdir,
            prefix,
            page_size,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn page_path(&self, index: usize) -> Utf8PathBuf {
        batcher::hashed_path(
            &self.outdir,
            &self.prefix,
            index,
            PAGE_PAD_WIDTH,
            PAGE_DIR_DEPTH,
            PAGE_SUFFIX,
        )
    }

    pub fn run(
        &self,
        query: &str,
        start_cursor: Option<String>,
        start_index: usize,
    ) -> Result<HarvestReport, PipelineError> {
        if self.page_size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }

        let page_size = self.page_size.to_string();
        let mut cursor = start_cursor;
        let mut index = start_index.max(1);
        let mut remaining = self.limit;
        let mut pages = 0;
        let mut records = 0;
        let mut completed = false;

        loop {
            if matches!(remaining, Some(0)) {
                info!("page budget exhausted, stopping scan");
                break;
            }

            let cursor_mark = cursor.clone().unwrap_or_else(|| START_CURSOR.to_string());
            let outcome = self.client.search(
                &[
                    ("query", query),
                    ("resultType", "core"),
                    ("format", "json"),
                    ("pageSize", page_size.as_str()),
                    ("cursorMark", cursor_mark.as_str()),
                ],
                OnFailure::AbortGraceful,
            );
            let data = match outcome {
                Ok(data) => data,
                Err(PipelineError::RetriesExhausted {
                    url,
                    retries,
                    graceful: true,
                }) => {
                    warn!("pausing scan after {retries} retries on {url}");
                    break;
                }
                Err(err) => return Err(err),
            };

            if data.as_object().map(|obj| obj.is_empty()).unwrap_or(false) {
                cursor = None;
                completed = true;
                break;
            }

            let results: Vec<Value> = epmc::result_rows(&data)
                .iter()
                .map(|row| Value::Object(epmc::extract_fields(row)))
                .collect();
            let page = json!({
                "cursor": cursor,
                "results": results,
            });
            let path = self.page_path(index);
            fs_util::write_json_atomic(&path, &page)?;
            info!("wrote page {index} ({} records) to {path}", results.len());

            pages += 1;
            records += results.len();
            index += 1;
            if let Some(value) = remaining.as_mut() {
                *value = value.saturating_sub(self.page_size as u64);
            }

            match data.get("nextCursorMark").and_then(Value::as_str) {
                Some(next) if next != cursor_mark => cursor = Some(next.to_string()),
                _ => {
                    cursor = None;
                    completed = true;
                    break;
                }
            }
        }

        Ok(HarvestReport {
            pages,
            records,
            completed,
            next_cursor: cursor,
            next_index: index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_query_quotes_each_key() {
        let keys = vec!["emdb".to_string(), "igsr".to_string()];
        assert_eq!(
            type_query(&keys),
            "ACCESSION_TYPE:\"emdb\" OR ACCESSION_TYPE:\"igsr\""
        );
        assert_eq!(type_query(&[]), "");
    }
}
