use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::time::Instant;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::domain::PublicationId;
use crate::error::PipelineError;
use crate::reconcile::{MetadataRecord, MetadataRecords};
use crate::store::{AccessionLink, NewPublication, Prediction, PublicationStore, Resource};

pub const PREDICTION_NAME: &str = "EuropePMC text-mined accession loading";
const SEPARATOR: &str = "---------------------------------------------------------------";

const RESOURCE_ALIASES: [(&str, &str); 7] = [
    ("Electron Microscopy Data Bank", "emdb"),
    ("IGSR/1000 Genomes", "igsr"),
    ("Complex Portal", "complexportal"),
    ("European Genome-Phenome Archive", "ega"),
    ("ClinicalTrials.gov", "nct"),
    ("EU Clinical Trials Register", "eudract"),
    ("MGnify", "metagenomics"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    Unresolved(i64),
    Resolved(Resource),
}

#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    entries: BTreeMap<String, ResourceEntry>,
}

impl ResourceCatalog {
    pub fn new(entries: BTreeMap<String, ResourceEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| PipelineError::ConfigRead(path.to_owned()))?;
        let entries: BTreeMap<String, ResourceEntry> = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;
        Ok(Self { entries })
    }

    pub fn type_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn key_for(&self, name: &str) -> Result<String, PipelineError> {
        let lowered = name.to_lowercase();
        if self.entries.contains_key(&lowered) {
            return Ok(lowered);
        }
        let alias = RESOURCE_ALIASES
            .iter()
            .find(|(display, _)| *display == name)
            .map(|(_, key)| (*key).to_string());
        match alias {
            Some(key) if self.entries.contains_key(&key) => Ok(key),
            _ => Err(PipelineError::UnknownResource(name.to_string())),
        }
    }

    pub fn resolve<S: PublicationStore>(
        &mut self,
        name: &str,
        store: &mut S,
    ) -> Result<Resource, PipelineError> {
        let key = self.key_for(name)?;
        if let Some(ResourceEntry::Unresolved(id)) = self.entries.get(&key) {
            let id = *id;
            let resource = store.fetch_resource(id)?.ok_or_else(|| {
                PipelineError::UnknownResource(format!("{name} (resource id {id})"))
            })?;
            self.entries.insert(key.clone(), ResourceEntry::Resolved(resource));
        }
        match self.entries.get(&key) {
            Some(ResourceEntry::Resolved(resource)) => Ok(resource.clone()),
            _ => Err(PipelineError::UnknownResource(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub resource: Resource,
    pub publications: usize,
    pub created: usize,
    pub existing: usize,
    pub accession_links: usize,
    pub max_seconds: f64,
    pub min_seconds: f64,
}

pub struct Loader<S: PublicationStore> {
    store: S,
    catalog: ResourceCatalog,
}

impl<S: PublicationStore> Loader<S> {
    pub fn new(store: S, catalog: ResourceCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn run(
        &mut self,
        records: &MetadataRecords,
        resource_name: &str,
        prediction: &Prediction,
        summary: &mut dyn Write,
    ) -> Result<LoadReport, PipelineError> {
        let prediction_id = self.store.record_prediction(prediction)?;
        let resource = self.catalog.resolve(resource_name, &mut self.store)?;

        let mut created = 0;
        let mut existing = 0;
        let mut accession_links = 0;
        let mut max_seconds = None::<f64>;
        let mut min_seconds = None::<f64>;

        for (key, record) in records {
            let title = record
                .fields
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("NA");
            let pmid = record
                .fields
                .get("pmid")
                .and_then(Value::as_str)
                .unwrap_or("NA");
            write_line(summary, SEPARATOR)?;
            write_line(summary, &format!("📖 {title} (PMID: {pmid})"))?;

            let started = Instant::now();
            let id = lookup_id(key, record)?;
            let found = self.store.find_publication(&id)?;
            let prepared = started.elapsed().as_secs_f64();

            let write_started = Instant::now();
            let publication_id = match found {
                Some(publication_id) => {
                    existing += 1;
                    write_line(summary, "    🔍 Publication already exists in database")?;
                    publication_id
                }
                None => {
                    let publication = build_publication(&id, record);
                    let publication_id = self.store.insert_publication(&publication)?;
                    created += 1;
                    write_line(summary, "    ✅ New publication written to database")?;
                    publication_id
                }
            };
            let written = write_started.elapsed().as_secs_f64();

            write_line(summary, &format!("1. Preparing publication record: {prepared:.3}s"))?;
            write_line(
                summary,
                &format!("2. Writing publication to database: {written:.3}s"),
            )?;

            for accession in &record.accessions {
                let inserted = self.store.upsert_accession(&AccessionLink {
                    accession: accession.clone(),
                    resource_id: resource.id,
                    prediction_id,
                    publication_id,
                })?;
                if inserted {
                    accession_links += 1;
                }
            }
            write_line(
                summary,
                &format!("🔗 New {resource_name} data links:{}", record.accessions.len()),
            )?;

            let total = started.elapsed().as_secs_f64();
            max_seconds = Some(max_seconds.map_or(total, |value| value.max(total)));
            min_seconds = Some(min_seconds.map_or(total, |value| value.min(total)));
            info!("loaded {key} ({} accessions)", record.accessions.len());
        }

        write_line(summary, "")?;
        write_line(summary, "📊 Summary of data loading:")?;
        write_line(
            summary,
            &format!("📈 Total number of publications loaded: {}", records.len()),
        )?;
        write_line(
            summary,
            &format!(
                "🕓 Maximum time taken for a publication: {:.3}s",
                max_seconds.unwrap_or(0.0)
            ),
        )?;
        write_line(
            summary,
            &format!(
                "🕓 Minimum time taken for a publication: {:.3}s",
                min_seconds.unwrap_or(0.0)
            ),
        )?;

        Ok(LoadReport {
            resource,
            publications: records.len(),
            created,
            existing,
            accession_links,
            max_seconds: max_seconds.unwrap_or(0.0),
            min_seconds: min_seconds.unwrap_or(0.0),
        })
    }
}

fn write_line(summary: &mut dyn Write, line: &str) -> Result<(), PipelineError> {
    writeln!(summary, "{line}").map_err(|err| PipelineError::Filesystem(err.to_string()))
}

fn lookup_id(key: &str, record: &MetadataRecord) -> Result<PublicationId, PipelineError> {
    if let Some(pmid) = record.fields.get("pmid").and_then(Value::as_str) {
        return Ok(PublicationId::Pmid(pmid.to_string()));
    }
    if let Some(pmcid) = record.fields.get("pmcid").and_then(Value::as_str) {
        return Ok(PublicationId::Pmcid(pmcid.to_string()));
    }
    key.parse()
}

fn build_publication(id: &PublicationId, record: &MetadataRecord) -> NewPublication {
    let fields = &record.fields;
    let pubmed_id = fields
        .get("pmid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| match id {
            PublicationId::Pmid(value) => Some(value.clone()),
            PublicationId::Pmcid(_) => None,
        });
    let pmc_id = fields
        .get("pmcid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| match id {
            PublicationId::Pmcid(value) => Some(value.clone()),
            PublicationId::Pmid(_) => None,
        });

    NewPublication {
        pubmed_id,
        pmc_id,
        title: fields.get("title").and_then(Value::as_str).map(str::to_string),
        author_string: fields
            .get("authorString")
            .and_then(Value::as_str)
            .map(str::to_string),
        journal: fields
            .get("journalInfo")
            .and_then(|info| info.get("journal"))
            .and_then(|journal| journal.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
        cited_by_count: fields.get("citedByCount").and_then(Value::as_i64),
        metadata: Value::Object(fields.clone()),
    }
}
