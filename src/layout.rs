use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const UNSUPPORTED_DIR: &str = "01_unsupported";
const INVALID_GLOBAL_DIR: &str = "02_invalid_global";
const VALID_DIR: &str = "04_processed_valid";
const REVIEW_DIR: &str = "05_processed_review_features";
const CANDIDATES_DIR: &str = "06_candidates_for_conversion";

const DETAIL_LEDGER: &str = "detailed_report.json";
const SUMMARY_LEDGER: &str = "summary_report.json";
const CONSOLIDATED: &str = "consolidated_valid_features.geojson";

/// The three per-dataset stores features are routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Valid,
    Review,
    Candidates,
}

impl Bucket {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "valid" => Some(Self::Valid),
            "review" => Some(Self::Review),
            "candidates" => Some(Self::Candidates),
            _ => None,
        }
    }
}

/// Directory conventions of one run's output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            self.unsupported_dir(),
            self.invalid_global_dir(),
            self.valid_dir(),
            self.review_dir(),
            self.candidates_dir(),
        ] {
            create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn unsupported_dir(&self) -> PathBuf {
        self.root.join(UNSUPPORTED_DIR)
    }

    pub fn invalid_global_dir(&self) -> PathBuf {
        self.root.join(INVALID_GLOBAL_DIR)
    }

    pub fn valid_dir(&self) -> PathBuf {
        self.root.join(VALID_DIR)
    }

    pub fn review_dir(&self) -> PathBuf {
        self.root.join(REVIEW_DIR)
    }

    pub fn candidates_dir(&self) -> PathBuf {
        self.root.join(CANDIDATES_DIR)
    }

    pub fn valid_store(&self, stem: &str) -> PathBuf {
        self.valid_dir().join(format!("{stem}_valid.geojson"))
    }

    pub fn review_store(&self, stem: &str) -> PathBuf {
        self.review_dir().join(format!("{stem}_review.geojson"))
    }

    pub fn candidate_store(&self, stem: &str) -> PathBuf {
        self.candidates_dir().join(format!("{stem}_candidates.geojson"))
    }

    pub fn store(&self, bucket: Bucket, stem: &str) -> PathBuf {
        match bucket {
            Bucket::Valid => self.valid_store(stem),
            Bucket::Review => self.review_store(stem),
            Bucket::Candidates => self.candidate_store(stem),
        }
    }

    pub fn detail_ledger(&self) -> PathBuf {
        self.root.join(DETAIL_LEDGER)
    }

    pub fn summary_ledger(&self) -> PathBuf {
        self.root.join(SUMMARY_LEDGER)
    }

    pub fn consolidated(&self) -> PathBuf {
        self.root.join(CONSOLIDATED)
    }
}
