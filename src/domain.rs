use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

pub type AccessionGroups = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicationId {
    Pmid(String),
    Pmcid(String),
}

impl PublicationId {
    pub fn as_str(&self) -> &str {
        match self {
            PublicationId::Pmid(value) | PublicationId::Pmcid(value) => value,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            PublicationId::Pmid(_) => "MED",
            PublicationId::Pmcid(_) => "PMC",
        }
    }

    pub fn search_clause(&self) -> String {
        match self {
            PublicationId::Pmid(value) => format!("EXT_ID:{value}"),
            PublicationId::Pmcid(value) => format!("PMCID:{value}"),
        }
    }

    pub fn article_path(&self) -> String {
        format!("article/{}/{}", self.source(), self.as_str())
    }
}

impl fmt::Display for PublicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PublicationId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if let Some(digits) = normalized.strip_prefix("PMC") {
            if !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()) {
                return Ok(PublicationId::Pmcid(normalized.to_string()));
            }
        } else if !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit()) {
            return Ok(PublicationId::Pmid(normalized.to_string()));
        }
        Err(PipelineError::InvalidIdentifier(value.to_string()))
    }
}
