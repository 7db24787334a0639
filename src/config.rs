use std::fs;
use std::str::FromStr;

use camino::Utf8Path;
use serde::Deserialize;

use crate::error::PipelineError;

pub const DB_USER_ENV: &str = "EPMC_DB_USER";
pub const DB_PASSWORD_ENV: &str = "EPMC_DB_PASSWORD";
pub const DEFAULT_DB_PORT: u16 = 5432;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    user: String,
    pass: String,
}

#[derive(Debug, Clone)]
pub struct DbCredentials {
    pub user: String,
    pub password: String,
}

impl DbCredentials {
    pub fn resolve(
        file: Option<&Utf8Path>,
        user: Option<String>,
        password: Option<String>,
    ) -> Result<Self, PipelineError> {
        if let Some(path) = file {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|_| PipelineError::CredentialsRead(path.to_owned()))?;
            let parsed: CredentialsFile = serde_json::from_str(&content)
                .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;
            return Ok(Self {
                user: parsed.user,
                password: parsed.pass,
            });
        }

        let user = user.or_else(|| env_value(DB_USER_ENV));
        let password = password.or_else(|| env_value(DB_PASSWORD_ENV));
        match (user, password) {
            (Some(user), Some(password)) => Ok(Self { user, password }),
            _ => Err(PipelineError::MissingCredentials),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub host: String,
    pub port: u16,
    pub dbname: String,
}

impl FromStr for DbTarget {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (address, dbname) = trimmed
            .split_once('/')
            .ok_or_else(|| PipelineError::InvalidDbTarget(value.to_string()))?;
        if address.is_empty() || dbname.is_empty() || dbname.contains('/') {
            return Err(PipelineError::InvalidDbTarget(value.to_string()));
        }

        let (host, port) = match address.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| PipelineError::InvalidDbTarget(value.to_string()))?;
                (host, port)
            }
            None => (address, DEFAULT_DB_PORT),
        };
        if host.is_empty() {
            return Err(PipelineError::InvalidDbTarget(value.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            dbname: dbname.to_string(),
        })
    }
}
