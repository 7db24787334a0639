use camino::Utf8Path;
use csv::ReaderBuilder;

use crate::domain::AccessionGroups;
use crate::error::PipelineError;
use crate::fs_util;

pub const LINK_SOURCES: [&str; 2] = ["MED", "PMC"];

pub fn read_grouped_json(path: &Utf8Path) -> Result<AccessionGroups, PipelineError> {
    fs_util::read_json(path)
}

pub fn read_links_csv(path: &Utf8Path) -> Result<AccessionGroups, PipelineError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path.as_std_path())
        .map_err(|_| PipelineError::InputRead(path.to_owned()))?;

    let mut groups = AccessionGroups::new();
    for record in reader.records() {
        let record = record.map_err(|err| PipelineError::CsvParse(err.to_string()))?;
        let accession = link_field(&record, 0)?;
        let ext_id = link_field(&record, 2)?;
        let source = link_field(&record, 3)?;
        if !LINK_SOURCES.contains(&source) {
            continue;
        }
        groups
            .entry(ext_id.to_string())
            .or_default()
            .push(accession.to_string());
    }
    Ok(groups)
}

fn link_field<'a>(record: &'a csv::StringRecord, index: usize) -> Result<&'a str, PipelineError> {
    record
        .get(index)
        .ok_or_else(|| PipelineError::CsvParse(format!("missing column {index} in row {record:?}")))
}
