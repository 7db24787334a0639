use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::{AccessionGroups, PublicationId};
use crate::epmc::{self, EpmcClient, EpmcTransport, OnFailure};
use crate::error::PipelineError;

pub const DEFAULT_QUERY_BATCH_SIZE: usize = 250;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub accessions: Vec<String>,
}

pub type MetadataRecords = BTreeMap<String, MetadataRecord>;

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub publications: usize,
    pub resolved_by_search: usize,
    pub resolved_by_fallback: usize,
    pub unresolved: Vec<String>,
}

pub struct Reconciler<'a, T: EpmcTransport> {
    client: &'a EpmcClient<T>,
    query_batch_size: usize,
    sources: Option<Vec<String>>,
}

impl<'a, T: EpmcTransport> Reconciler<'a, T> {
    pub fn new(client: &'a EpmcClient<T>, query_batch_size: usize) -> Self {
        Self {
            client,
            query_batch_size,
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = if sources.is_empty() {
            None
        } else {
            Some(sources)
        };
        self
    }

    pub fn reconcile(
        &self,
        groups: &AccessionGroups,
    ) -> Result<(MetadataRecords, ReconcileReport), PipelineError> {
        if self.query_batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }

        let mut parsed = Vec::with_capacity(groups.len());
        for id in groups.keys() {
            parsed.push((id.clone(), id.parse::<PublicationId>()?));
        }

        let mut records = MetadataRecords::new();
        let mut resolved_by_search = 0;
        let mut resolved_by_fallback = 0;
        let mut unresolved = Vec::new();

        for chunk in parsed.chunks(self.query_batch_size) {
            info!("searching metadata for {} identifiers", chunk.len());
            let query = self.chunk_query(chunk);
            let page_size = chunk.len().to_string();
            let data = self.client.search(
                &[
                    ("query", query.as_str()),
                    ("resultType", "core"),
                    ("format", "json"),
                    ("pageSize", page_size.as_str()),
                ],
                OnFailure::Abort,
            )?;

            let mut pending: Vec<&(String, PublicationId)> = chunk.iter().collect();
            for row in epmc::result_rows(&data) {
                let row_id = row.get("id").and_then(Value::as_str);
                let row_pmcid = row.get("pmcid").and_then(Value::as_str);
                let matched = pending
                    .iter()
                    .position(|(key, _)| Some(key.as_str()) == row_id)
                    .or_else(|| {
                        pending
                            .iter()
                            .position(|(key, _)| Some(key.as_str()) == row_pmcid)
                    });
                let Some(position) = matched else {
                    continue;
                };
                let (key, _) = pending.remove(position);
                records.insert(
                    key.clone(),
                    MetadataRecord {
                        fields: epmc::extract_fields(row),
                        accessions: groups.get(key).cloned().unwrap_or_default(),
                    },
                );
                resolved_by_search += 1;
            }

            for (key, id) in pending {
                let data = self.client.article(id, OnFailure::ReturnEmpty)?;
                let fields = match data.get("result") {
                    Some(row) => epmc::extract_fields(row),
                    None => Map::new(),
                };
                if fields.is_empty() {
                    warn!("no metadata found for {key}");
                    unresolved.push(key.clone());
                } else {
                    resolved_by_fallback += 1;
                }
                records.insert(
                    key.clone(),
                    MetadataRecord {
                        fields,
                        accessions: groups.get(key).cloned().unwrap_or_default(),
                    },
                );
            }
        }

        let report = ReconcileReport {
            publications: records.len(),
            resolved_by_search,
            resolved_by_fallback,
            unresolved,
        };
        Ok((records, report))
    }

    fn chunk_query(&self, chunk: &[(String, PublicationId)]) -> String {
        let clauses: Vec<String> = chunk.iter().map(|(_, id)| id.search_clause()).collect();
        let disjunction = clauses.join(" OR ");
        match &self.sources {
            Some(sources) => {
                let clauses: Vec<String> =
                    sources.iter().map(|source| format!("SRC:{source}")).collect();
                format!("({disjunction}) AND ({})", clauses.join(" OR "))
            }
            None => disjunction,
        }
    }
}
