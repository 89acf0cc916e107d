//! Scoring merged variants with external annotation collaborators.
//!
//! Both pipelines serialize rows to a minimal VCF with [`codec`], hand it to an
//! external scorer, and merge the scores back onto the rows by the same key
//! [`codec::record_key`] encoded them under:
//!
//!  - [`chunked`]: the CADD web service, driven chunk by chunk through an
//!    [`session::AnnotationSession`] (submit, poll until ready, fetch).
//!  - [`spliceai`]: the SpliceAI command line tool, run once over all rows.

pub mod chunked;
pub mod codec;
pub mod retry;
pub mod session;
pub mod spliceai;

use std::fmt;

use crate::error::VarMergeError;

/// The lifecycle of one chunk's remote annotation job.
///
/// ```text
/// Created -> Submitted -> Polling -> Ready -> Fetched -> Parsed -> Merged
/// ```
///
/// `Polling` may repeat. A chunk with nothing to score goes straight from
/// `Created` to `Merged`. Every state except `Merged` may move to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Created,
    Submitted,
    Polling,
    Ready,
    Fetched,
    Parsed,
    Merged,
    Failed,
}

impl JobState {
    /// Whether moving from `self` to `next` is legal.
    pub fn can_transition(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Created, Merged)
                | (Submitted, Polling)
                | (Polling, Polling)
                | (Polling, Ready)
                | (Ready, Fetched)
                | (Fetched, Parsed)
                | (Parsed, Merged)
        ) || (next == Failed && !matches!(self, Merged | Failed))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Merged | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The identifier the remote service gave a submitted job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    /// The job's result file name, e.g. `GRCh38-v1.7_<hash>.tsv.gz`.
    pub job_file: String,
}

impl JobHandle {
    pub fn new(job_file: impl Into<String>) -> Self {
        Self {
            job_file: job_file.into(),
        }
    }
}

/// One chunk's job and its current state.
#[derive(Clone, Debug)]
pub struct AnnotationJob {
    pub chunk_id: usize,
    state: JobState,
    handle: Option<JobHandle>,
}

impl AnnotationJob {
    pub fn new(chunk_id: usize) -> Self {
        Self {
            chunk_id,
            state: JobState::Created,
            handle: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    /// Move to `next`, or fail with [`VarMergeError::InvalidJobTransition`].
    pub fn transition(&mut self, next: JobState) -> Result<(), VarMergeError> {
        if !self.state.can_transition(next) {
            return Err(VarMergeError::InvalidJobTransition {
                from: self.state,
                to: next,
            });
        }
        log::debug!("chunk {}: {} -> {}", self.chunk_id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record the handle of a submitted job.
    pub fn submitted(&mut self, handle: JobHandle) -> Result<(), VarMergeError> {
        self.transition(JobState::Submitted)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Close a job that had nothing to submit; its rows pass through unscored.
    pub fn skipped(&mut self) -> Result<(), VarMergeError> {
        self.transition(JobState::Merged)
    }

    /// Move to `Failed`. An illegal transition is logged, not returned.
    pub fn fail(&mut self) {
        if let Err(e) = self.transition(JobState::Failed) {
            log::warn!("chunk {}: {}", self.chunk_id, e);
        }
    }

    /// The handle of a submitted job.
    pub fn require_handle(&self) -> Result<&JobHandle, VarMergeError> {
        self.handle.as_ref().ok_or(VarMergeError::InvalidJobTransition {
            from: self.state,
            to: JobState::Polling,
        })
    }
}
