use std::io::{self, Write};

use serde::Serialize;

use crate::batcher::BatchReport;
use crate::harvest::HarvestReport;
use crate::loader::LoadReport;
use crate::reconcile::ReconcileReport;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_group(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_query(report: &ReconcileReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_harvest(report: &HarvestReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_load(report: &LoadReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
