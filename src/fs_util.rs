use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::error::PipelineError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path.as_std_path()).map_err(|err| PipelineError::Filesystem(err.to_string()))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let temp = Builder::new()
        .prefix("epmc-ap-file")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), PipelineError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, PipelineError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| PipelineError::InputRead(path.to_owned()))?;
    serde_json::from_str(&content).map_err(|err| PipelineError::InputParse(err.to_string()))
}
