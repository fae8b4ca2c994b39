use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classifier::Action;
use crate::error::{Error, Result};
use crate::io::write_json_atomic;

/// Per-dataset feature counts. `total` always equals
/// `valid_large + review + candidates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub total: usize,
    pub valid_large: usize,
    pub review: usize,
    pub autofixed: usize,
    pub candidates: usize,
}

impl PartitionStats {
    pub fn has_issues(&self) -> bool {
        self.review > 0 || self.candidates > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalStatus {
    Valid,
    #[serde(rename = "Requires Review")]
    RequiresReview,
    #[serde(rename = "Candidate for Conversion")]
    Candidate,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Valid => write!(f, "Valid"),
            FinalStatus::RequiresReview => write!(f, "Requires Review"),
            FinalStatus::Candidate => write!(f, "Candidate for Conversion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTaken {
    #[serde(rename = "Auto-fixed")]
    AutoFixed,
    Simplified,
    Segregated,
    Identified,
    #[serde(rename = "N/A")]
    None,
    #[serde(rename = "Converted to Point")]
    ConvertedToPoint,
}

impl ActionTaken {
    /// The classifier's action, or `fallback` when there was none.
    pub fn from_action(action: Option<Action>, fallback: ActionTaken) -> Self {
        match action {
            Some(Action::AutoFixed) => ActionTaken::AutoFixed,
            Some(Action::Simplified) => ActionTaken::Simplified,
            None => fallback,
        }
    }
}

/// One line of the detailed report: the fate of a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub dataset: String,
    #[serde(rename = "qa_assistant_id")]
    pub identifier: String,
    pub final_status: FinalStatus,
    pub action_taken: ActionTaken,
    pub reason: String,
    pub attribute_status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitialStatus {
    PassedPrecheck,
    WrongEpsg,
    Unreadable,
    Unsupported,
    /// Another input of the same batch already has this file stem.
    DuplicateName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    ProcessedClean,
    ProcessedWithIssues,
    Skipped,
}

/// One line of the summary report: the fate of a whole input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub dataset: String,
    pub initial_status: InitialStatus,
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub stats: Option<PartitionStats>,
    pub attribute_summary: String,
    pub notes: String,
}

impl SummaryRow {
    pub fn skipped(dataset: impl Into<String>, status: InitialStatus, notes: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            initial_status: status,
            processing_status: ProcessingStatus::Skipped,
            stats: None,
            attribute_summary: String::new(),
            notes: notes.into(),
        }
    }
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(path, e)),
    };
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// The detailed report as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailLedger {
    pub rows: Vec<DetailRow>,
}

impl DetailLedger {
    /// A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            rows: load_rows(path)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn dataset_of(&self, identifier: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.identifier == identifier)
            .map(|r| r.dataset.as_str())
    }

    /// Marks the rows of converted features valid; returns how many changed.
    pub fn mark_converted(&mut self, identifiers: &HashSet<String>) -> usize {
        let mut updated = 0;
        for row in self
            .rows
            .iter_mut()
            .filter(|r| identifiers.contains(&r.identifier))
        {
            row.final_status = FinalStatus::Valid;
            row.action_taken = ActionTaken::ConvertedToPoint;
            updated += 1;
        }
        updated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryLedger {
    pub rows: Vec<SummaryRow>,
}

impl SummaryLedger {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            rows: load_rows(path)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}
