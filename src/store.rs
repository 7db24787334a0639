use chrono::NaiveDate;
use postgres::{Client, NoTls};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DbCredentials, DbTarget};
use crate::domain::PublicationId;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub name: String,
    pub date: NaiveDate,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct NewPublication {
    pub pubmed_id: Option<String>,
    pub pmc_id: Option<String>,
    pub title: Option<String>,
    pub author_string: Option<String>,
    pub journal: Option<String>,
    pub cited_by_count: Option<i64>,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct AccessionLink {
    pub accession: String,
    pub resource_id: i64,
    pub prediction_id: i64,
    pub publication_id: i64,
}

pub trait PublicationStore {
    fn record_prediction(&mut self, prediction: &Prediction) -> Result<i64, PipelineError>;
    fn fetch_resource(&mut self, id: i64) -> Result<Option<Resource>, PipelineError>;
    fn find_publication(&mut self, id: &PublicationId) -> Result<Option<i64>, PipelineError>;
    fn insert_publication(&mut self, publication: &NewPublication) -> Result<i64, PipelineError>;
    fn upsert_accession(&mut self, link: &AccessionLink) -> Result<bool, PipelineError>;
}

pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn connect(target: &DbTarget, credentials: &DbCredentials) -> Result<Self, PipelineError> {
        let client = postgres::Config::new()
            .host(&target.host)
            .port(target.port)
            .dbname(&target.dbname)
            .user(&credentials.user)
            .password(&credentials.password)
            .connect(NoTls)
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(Self { client })
    }
}

impl PublicationStore for PgStore {
    fn record_prediction(&mut self, prediction: &Prediction) -> Result<i64, PipelineError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO predictions (name, date, username) VALUES ($1, $2, $3) RETURNING id",
                &[&prediction.name, &prediction.date, &prediction.user],
            )
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(row.get(0))
    }

    fn fetch_resource(&mut self, id: i64) -> Result<Option<Resource>, PipelineError> {
        let row = self
            .client
            .query_opt("SELECT id, name FROM resources WHERE id = $1", &[&id])
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(row.map(|row| Resource {
            id: row.get(0),
            name: row.get(1),
        }))
    }

    fn find_publication(&mut self, id: &PublicationId) -> Result<Option<i64>, PipelineError> {
        let (sql, value) = match id {
            PublicationId::Pmid(value) => {
                ("SELECT id FROM publications WHERE pubmed_id = $1", value)
            }
            PublicationId::Pmcid(value) => {
                ("SELECT id FROM publications WHERE pmc_id = $1", value)
            }
        };
        let row = self
            .client
            .query_opt(sql, &[value])
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(row.map(|row| row.get(0)))
    }

    fn insert_publication(&mut self, publication: &NewPublication) -> Result<i64, PipelineError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO publications \
                 (pubmed_id, pmc_id, title, author_string, journal, cited_by_count, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
                &[
                    &publication.pubmed_id,
                    &publication.pmc_id,
                    &publication.title,
                    &publication.author_string,
                    &publication.journal,
                    &publication.cited_by_count,
                    &publication.metadata,
                ],
            )
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(row.get(0))
    }

    fn upsert_accession(&mut self, link: &AccessionLink) -> Result<bool, PipelineError> {
        let inserted = self
            .client
            .execute(
                "INSERT INTO accessions (accession, resource_id, prediction_id, publication_id) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
                &[
                    &link.accession,
                    &link.resource_id,
                    &link.prediction_id,
                    &link.publication_id,
                ],
            )
            .map_err(|err| PipelineError::Database(err.to_string()))?;
        Ok(inserted > 0)
    }
}
