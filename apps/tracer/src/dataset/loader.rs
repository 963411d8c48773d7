//! Relational Loader: reads the event log, code snapshots and subject tables,
//! plus the curriculum and problem reference data.
//!
//! Loading is all-or-nothing: if any table is missing or unreadable the caller
//! gets a `LoadError` and no partial row-set.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use crate::dataset::models::{
    CodeStateRow, CurriculumTopic, EventRow, ProblemDescriptions, ProblemRow, SubjectRow,
    SubmissionTables,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Locations of the three relational tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePaths {
    pub events: PathBuf,
    pub code_states: PathBuf,
    pub subjects: PathBuf,
}

impl TablePaths {
    /// Standard CodeWorkout layout under one dataset directory.
    pub fn in_dataset_dir(dir: &Path) -> Self {
        Self {
            events: dir.join("MainTable.csv"),
            code_states: dir.join("LinkTables").join("CodeStates.csv"),
            subjects: dir.join("LinkTables").join("Subject.csv"),
        }
    }
}

/// Loads all three tables. Fails on the first table that cannot be read.
pub fn load_tables(paths: &TablePaths) -> Result<SubmissionTables, LoadError> {
    info!("Loading datasets...");

    let events: Vec<EventRow> = read_csv(&paths.events)?;
    info!("Main table: {} rows", events.len());

    let code_states: Vec<CodeStateRow> = read_csv(&paths.code_states)?;
    info!("CodeState table: {} rows", code_states.len());

    let subjects: Vec<SubjectRow> = read_csv(&paths.subjects)?;
    info!("Subject table: {} rows", subjects.len());

    Ok(SubmissionTables {
        events,
        code_states,
        subjects,
    })
}

/// Loads the curriculum taxonomy, a JSON array of topics, ordered by chapter.
pub fn load_curriculum(path: &Path) -> Result<Vec<CurriculumTopic>, LoadError> {
    let file = open(path)?;
    let mut topics: Vec<CurriculumTopic> =
        serde_json::from_reader(file).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    // stable: topics within a chapter keep file order
    topics.sort_by_key(|t| t.chapter);
    info!("Curriculum: {} topics", topics.len());
    Ok(topics)
}

/// Loads the problem reference table (`ProblemID`, `Requirement`).
pub fn load_problems(path: &Path) -> Result<ProblemDescriptions, LoadError> {
    let rows: Vec<ProblemRow> = read_csv(path)?;
    let problems: ProblemDescriptions = rows
        .into_iter()
        .map(|row| (row.problem_id, row.requirement))
        .collect();
    info!("Problem descriptions: {} problems", problems.len());
    Ok(problems)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let mut reader = csv::Reader::from_reader(open(path)?);
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}
