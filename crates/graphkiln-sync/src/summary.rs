//! Run-level results

use graphkiln_core::{ConsistencyRisk, DocumentId};
use std::fmt;

/// A document that ended the run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub document_id: DocumentId,
    /// Short error kind, see `SyncError::kind`
    pub kind: &'static str,
    pub message: String,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Documents published or updated
    pub synced: usize,
    /// Documents retracted
    pub tombstoned: usize,
    /// Documents already in sync; no request was sent
    pub unchanged: usize,
    /// Documents never started because the run was cancelled
    pub skipped: usize,
    pub failures: Vec<FailedDocument>,
    pub consistency_risks: Vec<ConsistencyRisk>,
}

impl SyncSummary {
    /// Number of failed documents
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether every document ended without error
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Documents the run looked at
    pub fn total(&self) -> usize {
        self.synced + self.tombstoned + self.unchanged + self.skipped + self.failed()
    }

    /// Fold another partial summary into this one
    pub fn merge(&mut self, other: SyncSummary) {
        self.synced += other.synced;
        self.tombstoned += other.tombstoned;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.consistency_risks.extend(other.consistency_risks);
    }

    pub(crate) fn sort(&mut self) {
        self.failures.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        self.consistency_risks.sort_by(|a, b| a.document_id.cmp(&b.document_id));
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} synced, {} tombstoned, {} unchanged, {} skipped, {} failed",
            self.synced,
            self.tombstoned,
            self.unchanged,
            self.skipped,
            self.failed()
        )?;
        for failure in &self.failures {
            write!(f, "\n  failed {} [{}]: {}", failure.document_id, failure.kind, failure.message)?;
        }
        for risk in &self.consistency_risks {
            write!(f, "\n  consistency risk: {risk}")?;
        }
        Ok(())
    }
}
