use std::collections::BTreeMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use epmc_accession_pipeline::domain::AccessionGroups;
use epmc_accession_pipeline::epmc::{EpmcClient, EpmcTransport, OnFailure, RawResponse};
use epmc_accession_pipeline::error::PipelineError;
use epmc_accession_pipeline::reconcile::Reconciler;

struct StubEpmc {
    search_responses: Mutex<Vec<Value>>,
    article_responses: BTreeMap<String, Value>,
    search_urls: Mutex<Vec<String>>,
    article_urls: Mutex<Vec<String>>,
}

impl StubEpmc {
    fn new(search_responses: Vec<Value>, article_responses: BTreeMap<String, Value>) -> Self {
        Self {
            search_responses: Mutex::new(search_responses),
            article_responses,
            search_urls: Mutex::new(Vec::new()),
            article_urls: Mutex::new(Vec::new()),
        }
    }

    fn search_urls(&self) -> Vec<String> {
        self.search_urls.lock().unwrap().clone()
    }

    fn article_urls(&self) -> Vec<String> {
        self.article_urls.lock().unwrap().clone()
    }
}

impl EpmcTransport for &StubEpmc {
    fn get(&self, url: &str) -> Result<RawResponse, PipelineError> {
        let body = if url.contains("/search?") {
            self.search_urls.lock().unwrap().push(url.to_string());
            let mut responses = self.search_responses.lock().unwrap();
            if responses.is_empty() {
                json!({"hitCount": 0})
            } else {
                responses.remove(0)
            }
        } else {
            self.article_urls.lock().unwrap().push(url.to_string());
            self.article_responses
                .iter()
                .find(|(id, _)| url.contains(id.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| json!({"hitCount": 0}))
        };
        Ok(RawResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}

fn client(stub: &StubEpmc) -> EpmcClient<&StubEpmc> {
    EpmcClient::with_transport(stub, "https://epmc.test/rest".to_string())
        .with_retry_policy(2, 0..=0)
}

fn groups(entries: &[(&str, &[&str])]) -> AccessionGroups {
    entries
        .iter()
        .map(|(id, accessions)| {
            (
                id.to_string(),
                accessions.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

#[test]
fn bulk_search_resolves_matched_rows() {
    let stub = StubEpmc::new(
        vec![json!({
            "hitCount": 2,
            "resultList": {"result": [
                {"id": "12345", "pmid": "12345", "title": "First"},
                {"id": "67890", "pmid": "67890", "title": "Second"},
            ]},
        })],
        BTreeMap::new(),
    );
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("12345", &["ACC1", "ACC2"]), ("67890", &["ACC3"])]);
    let (records, report) = reconciler.reconcile(&input).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records["12345"].fields["title"], json!("First"));
    assert_eq!(records["12345"].accessions, vec!["ACC1", "ACC2"]);
    assert_eq!(records["67890"].accessions, vec!["ACC3"]);
    assert_eq!(report.resolved_by_search, 2);
    assert_eq!(report.resolved_by_fallback, 0);
    assert!(report.unresolved.is_empty());
    assert!(stub.article_urls().is_empty());
}

#[test]
fn fallback_fills_identifiers_missing_from_search() {
    let stub = StubEpmc::new(
        vec![json!({
            "hitCount": 1,
            "resultList": {"result": [{"id": "12345", "pmid": "12345", "title": "Hit"}]},
        })],
        BTreeMap::from([(
            "PMC999".to_string(),
            json!({
                "hitCount": 1,
                "result": {"pmcid": "PMC999", "title": "Fallback hit"},
            }),
        )]),
    );
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("12345", &["ACC1"]), ("PMC999", &["ACC2"])]);
    let (records, report) = reconciler.reconcile(&input).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records["PMC999"].fields["title"], json!("Fallback hit"));
    assert_eq!(records["PMC999"].accessions, vec!["ACC2"]);
    assert_eq!(report.resolved_by_search, 1);
    assert_eq!(report.resolved_by_fallback, 1);
    assert!(report.unresolved.is_empty());
    assert_eq!(stub.article_urls().len(), 1);
    assert!(stub.article_urls()[0].contains("article/PMC/PMC999"));
}

#[test]
fn row_id_takes_precedence_over_pmcid() {
    let stub = StubEpmc::new(
        vec![json!({
            "hitCount": 2,
            "resultList": {"result": [
                {"id": "12345", "pmcid": "PMC999", "title": "Row one"},
                {"id": "77777", "pmcid": "PMC999", "title": "Row two"},
            ]},
        })],
        BTreeMap::new(),
    );
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("12345", &["ACC1"]), ("PMC999", &["ACC2"])]);
    let (records, report) = reconciler.reconcile(&input).unwrap();

    assert_eq!(records["12345"].fields["title"], json!("Row one"));
    assert_eq!(records["PMC999"].fields["title"], json!("Row two"));
    assert_eq!(report.resolved_by_search, 2);
    assert!(stub.article_urls().is_empty());
}

#[test]
fn unresolved_identifiers_still_produce_records() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("12345", &["ACC1"]), ("PMC999", &["ACC2"])]);
    let (records, report) = reconciler.reconcile(&input).unwrap();

    assert_eq!(records.len(), 2);
    assert!(records["12345"].fields.is_empty());
    assert_eq!(records["12345"].accessions, vec!["ACC1"]);
    assert!(records["PMC999"].fields.is_empty());
    assert_eq!(report.resolved_by_search, 0);
    assert_eq!(report.resolved_by_fallback, 0);
    assert_eq!(report.unresolved, vec!["12345", "PMC999"]);
}

#[test]
fn chunked_search_bounds_disjunction_size() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 2);

    let input = groups(&[
        ("11111", &["A"]),
        ("22222", &["B"]),
        ("33333", &["C"]),
        ("44444", &["D"]),
        ("55555", &["E"]),
    ]);
    let (records, _) = reconciler.reconcile(&input).unwrap();

    assert_eq!(records.len(), 5);
    let urls = stub.search_urls();
    assert_eq!(urls.len(), 3);
    assert!(urls[0].contains("pageSize=2"));
    assert!(urls[0].contains("EXT_ID%3A11111%20OR%20EXT_ID%3A22222"));
    assert!(urls[2].contains("pageSize=1"));
    assert!(urls[2].contains("EXT_ID%3A55555"));
}

#[test]
fn source_restriction_wraps_query() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler =
        Reconciler::new(&client, 250).with_sources(vec!["MED".to_string(), "PMC".to_string()]);

    let input = groups(&[("12345", &["ACC1"])]);
    reconciler.reconcile(&input).unwrap();

    let urls = stub.search_urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("%28EXT_ID%3A12345%29%20AND%20%28SRC%3AMED%20OR%20SRC%3APMC%29"));
}

#[test]
fn pmcid_routing_uses_pmcid_clause() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("PMC999", &["ACC1"])]);
    reconciler.reconcile(&input).unwrap();

    assert!(stub.search_urls()[0].contains("PMCID%3APMC999"));
}

#[test]
fn invalid_identifier_fails_before_any_request() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 250);

    let input = groups(&[("12345", &["ACC1"]), ("not-an-id", &["ACC2"])]);
    let err = reconciler.reconcile(&input).unwrap_err();

    assert_matches!(err, PipelineError::InvalidIdentifier(_));
    assert!(stub.search_urls().is_empty());
    assert!(stub.article_urls().is_empty());
}

#[test]
fn zero_batch_size_is_rejected() {
    let stub = StubEpmc::new(Vec::new(), BTreeMap::new());
    let client = client(&stub);
    let reconciler = Reconciler::new(&client, 0);

    let err = reconciler.reconcile(&groups(&[("12345", &["A"])])).unwrap_err();
    assert_matches!(err, PipelineError::InvalidBatchSize);
}
