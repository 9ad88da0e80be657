//! Durable chunk -> job -> sample status tracking
//!
//! Every mutation is applied to a copy of the state, written to disk
//! atomically and only then swapped in. What the tracker reports is
//! therefore always what is on disk, and a failed write leaves both
//! untouched. Chunk-level updates (submission, array reports,
//! cancellation) land in a single write so no reader observes a
//! partially-updated chunk.
//!
//! The audit trail is not part of the snapshot. Entries produced by a
//! commit are appended to a JSON-lines journal next to it
//! (`state.json` -> `state.audit.jsonl`) once the snapshot is written.

mod records;

pub use records::{AuditEntry, AuditKind, ChunkRecord, ChunkState, ReportOutcome, TrackerSummary};

use crate::error::{Result, SchedError};
use crate::manifest;
use crate::models::{Sample, SampleStatus, SubmissionPlan};
use crate::persist;
use crate::scheduler::{ArrayStatusReport, JobId};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrackerState {
    /// Samples in manifest order
    samples: Vec<Sample>,
    chunks: Vec<ChunkRecord>,
    /// sample_id -> chunk currently responsible for it
    assignments: HashMap<String, String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// Audit entries produced by the commit in progress
    #[serde(skip)]
    journal: Vec<AuditEntry>,
}

enum Transition {
    Applied,
    Unchanged,
    Rejected(SampleStatus),
}

impl TrackerState {
    fn reindex(&mut self) {
        self.index = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.sample_id.clone(), i))
            .collect();
    }

    fn add_sample(&mut self, sample: Sample) -> bool {
        if self.index.contains_key(&sample.sample_id) {
            return false;
        }
        self.index
            .insert(sample.sample_id.clone(), self.samples.len());
        self.samples.push(sample);
        true
    }

    fn sample_mut(&mut self, sample_id: &str) -> Result<&mut Sample> {
        let idx = *self
            .index
            .get(sample_id)
            .ok_or_else(|| SchedError::UnknownSample(sample_id.to_string()))?;
        Ok(&mut self.samples[idx])
    }

    fn chunk_mut(&mut self, chunk_id: &str) -> Result<&mut ChunkRecord> {
        self.chunks
            .iter_mut()
            .find(|c| c.chunk_id == chunk_id)
            .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))
    }

    /// Apply one status change under the forward-only law, auditing the outcome
    fn transition(
        &mut self,
        sample_id: &str,
        to: SampleStatus,
        chunk_id: Option<&str>,
        reason: Option<&str>,
        at: i64,
    ) -> Result<Transition> {
        let sample = self.sample_mut(sample_id)?;
        let from = sample.status;
        if from == to {
            return Ok(Transition::Unchanged);
        }

        let outcome = if from.can_transition_to(to) {
            sample.status = to;
            Transition::Applied
        } else {
            Transition::Rejected(from)
        };

        self.journal.push(AuditEntry {
            at,
            sample_id: sample_id.to_string(),
            from,
            to,
            kind: match outcome {
                Transition::Rejected(_) => AuditKind::Rejected,
                _ => AuditKind::Transition,
            },
            chunk_id: chunk_id.map(str::to_string),
            reason: reason.map(str::to_string),
        });

        Ok(outcome)
    }

    fn release_assignments(&mut self, chunk_id: &str) {
        self.assignments.retain(|_, owner| owner != chunk_id);
    }
}

/// Durable record of samples, chunks and their status history
pub struct StateTracker {
    path: PathBuf,
    audit_path: PathBuf,
    state: TrackerState,
    audit: Vec<AuditEntry>,
}

/// Journal file kept beside the state snapshot
pub fn audit_path_for(state_path: &Path) -> PathBuf {
    state_path.with_extension("audit.jsonl")
}

impl StateTracker {
    /// Open the tracker at `path`, seeding it with `samples`
    ///
    /// Existing state wins for samples it already knows; unknown samples
    /// are appended in the given order.
    pub fn open(path: impl Into<PathBuf>, samples: Vec<Sample>) -> Result<Self> {
        let path = path.into();
        let mut state = match persist::read_json::<TrackerState>(&path)? {
            Some(state) => state,
            None => TrackerState::default(),
        };
        state.reindex();

        let known = state.samples.len();
        let mut duplicates = 0usize;
        for sample in samples {
            if !state.add_sample(sample) {
                duplicates += 1;
            }
        }
        let added = state.samples.len() - known;

        persist::write_json(&path, &state)?;
        let audit_path = audit_path_for(&path);
        let audit = persist::read_json_lines(&audit_path)?;
        info!(
            path = %path.display(),
            samples = state.samples.len(),
            added = added,
            already_known = duplicates,
            chunks = state.chunks.len(),
            audit_entries = audit.len(),
            "State tracker opened"
        );

        Ok(Self {
            path,
            audit_path,
            state,
            audit,
        })
    }

    /// Open existing state without seeding samples
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = persist::read_json::<TrackerState>(&path)?
            .with_context(|| format!("No tracker state at {}", path.display()))?;
        state.reindex();
        let audit_path = audit_path_for(&path);
        let audit = persist::read_json_lines(&audit_path)?;
        Ok(Self {
            path,
            audit_path,
            state,
            audit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit<T>(&mut self, apply: impl FnOnce(&mut TrackerState) -> Result<T>) -> Result<T> {
        let mut next = self.state.clone();
        let value = apply(&mut next)?;
        let entries = std::mem::take(&mut next.journal);
        persist::write_json(&self.path, &next)?;
        self.state = next;

        // The snapshot is authoritative; a lost journal append only loses history
        if let Err(e) = persist::append_json_lines(&self.audit_path, &entries) {
            warn!(
                path = %self.audit_path.display(),
                entries = entries.len(),
                error = %e,
                "Failed to append audit entries"
            );
        }
        self.audit.extend(entries);
        Ok(value)
    }

    /// Record a plan as a `planned` chunk owning its samples
    ///
    /// Every member must be `pending` and not owned by another live chunk.
    pub fn record_plan(&mut self, plan: &SubmissionPlan) -> Result<()> {
        let at = now();
        self.commit(|state| {
            let chunk_id = &plan.chunk.chunk_id;
            if state.chunks.iter().any(|c| &c.chunk_id == chunk_id) {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.clone(),
                    reason: "chunk id already recorded".to_string(),
                });
            }
            if plan.chunk.is_empty() {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.clone(),
                    reason: "chunk has no samples".to_string(),
                });
            }

            for member in &plan.chunk.samples {
                let status = state.sample_mut(&member.sample_id)?.status;
                if status != SampleStatus::Pending {
                    return Err(SchedError::ChunkConflict {
                        chunk_id: chunk_id.clone(),
                        reason: format!("sample {} is {}", member.sample_id, status),
                    });
                }
                if let Some(owner) = state.assignments.get(&member.sample_id) {
                    return Err(SchedError::ChunkConflict {
                        chunk_id: chunk_id.clone(),
                        reason: format!("sample {} already belongs to {}", member.sample_id, owner),
                    });
                }
                state
                    .assignments
                    .insert(member.sample_id.clone(), chunk_id.clone());
            }

            state.chunks.push(ChunkRecord::from_plan(plan, at));
            Ok(())
        })?;

        debug!(chunk_id = %plan.chunk.chunk_id, samples = plan.array_size(), "Plan recorded");
        Ok(())
    }

    /// Drop a planned chunk; its samples become available for re-chunking
    pub fn withdraw_chunk(&mut self, chunk_id: &str) -> Result<()> {
        self.close_planned(chunk_id, ChunkState::Withdrawn, None)
    }

    /// Mark a planned chunk as refused by the scheduler, returning its samples to the pool
    pub fn release_chunk(&mut self, chunk_id: &str, reason: &str) -> Result<()> {
        self.close_planned(chunk_id, ChunkState::SubmitFailed, Some(reason))
    }

    fn close_planned(&mut self, chunk_id: &str, to: ChunkState, note: Option<&str>) -> Result<()> {
        self.commit(|state| {
            let chunk = state.chunk_mut(chunk_id)?;
            if chunk.state != ChunkState::Planned {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("cannot close a {} chunk", chunk.state.as_str()),
                });
            }
            chunk.state = to;
            chunk.note = note.map(str::to_string);
            state.release_assignments(chunk_id);
            Ok(())
        })?;
        info!(chunk_id = chunk_id, state = to.as_str(), "Chunk closed before submission");
        Ok(())
    }

    /// Fail samples whose input vanished and drop them from their planned chunk
    pub fn mark_inputs_missing(&mut self, chunk_id: &str, sample_ids: &[String]) -> Result<()> {
        if sample_ids.is_empty() {
            return Ok(());
        }
        let at = now();
        self.commit(|state| {
            let chunk = state.chunk_mut(chunk_id)?;
            if chunk.state != ChunkState::Planned {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: "members of a submitted chunk are fixed".to_string(),
                });
            }
            if let Some(stranger) = sample_ids.iter().find(|id| !chunk.sample_ids.contains(id)) {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("sample {} is not a member", stranger),
                });
            }
            chunk.sample_ids.retain(|id| !sample_ids.contains(id));
            chunk.excluded.extend(sample_ids.iter().cloned());

            for sample_id in sample_ids {
                state.transition(
                    sample_id,
                    SampleStatus::Failed,
                    Some(chunk_id),
                    Some("input missing"),
                    at,
                )?;
                state.assignments.remove(sample_id);
            }
            Ok(())
        })
    }

    /// Record scheduler acceptance: chunk `submitted`, owned members `submitted`
    pub fn mark_submitted(&mut self, chunk_id: &str, job_id: &JobId) -> Result<()> {
        let at = now();
        self.commit(|state| {
            let chunk = state.chunk_mut(chunk_id)?;
            if chunk.state != ChunkState::Planned {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("cannot submit a {} chunk", chunk.state.as_str()),
                });
            }
            chunk.state = ChunkState::Submitted;
            chunk.job_id = Some(job_id.0.clone());
            chunk.submitted_at = Some(at);
            let members = chunk.sample_ids.clone();

            for sample_id in &members {
                if state.assignments.get(sample_id).map(String::as_str) != Some(chunk_id) {
                    continue;
                }
                state.transition(sample_id, SampleStatus::Submitted, Some(chunk_id), None, at)?;
            }
            Ok(())
        })
    }

    /// Record a confirmed scheduler kill: non-terminal members become `failed`
    pub fn mark_cancelled(&mut self, chunk_id: &str) -> Result<usize> {
        let at = now();
        self.commit(|state| {
            let chunk = state.chunk_mut(chunk_id)?;
            if chunk.state != ChunkState::Submitted {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("cannot cancel a {} chunk", chunk.state.as_str()),
                });
            }
            chunk.state = ChunkState::Cancelled;
            let members = chunk.sample_ids.clone();

            let mut failed = 0;
            for sample_id in &members {
                if state.assignments.get(sample_id).map(String::as_str) != Some(chunk_id)
                    || state.sample_mut(sample_id)?.status.is_terminal()
                {
                    continue;
                }
                if let Transition::Applied = state.transition(
                    sample_id,
                    SampleStatus::Failed,
                    Some(chunk_id),
                    Some("cancelled"),
                    at,
                )? {
                    failed += 1;
                }
            }
            Ok(failed)
        })
    }

    /// Apply a forward status change to one sample
    ///
    /// Repeating the current status is a no-op. Backward or out-of-terminal
    /// changes are recorded in the audit trail and rejected with
    /// [`SchedError::StatusUpdateConflict`].
    pub fn update_status(&mut self, sample_id: &str, status: SampleStatus) -> Result<()> {
        if self.status_of(sample_id)? == status {
            return Ok(());
        }

        let at = now();
        let chunk_id = self.state.assignments.get(sample_id).cloned();
        let outcome = self.commit(|state| {
            state.transition(sample_id, status, chunk_id.as_deref(), None, at)
        })?;

        match outcome {
            Transition::Rejected(from) => {
                warn!(
                    sample_id = sample_id,
                    from = %from,
                    to = %status,
                    "Rejected backward status update"
                );
                Err(SchedError::StatusUpdateConflict {
                    sample_id: sample_id.to_string(),
                    from,
                    to: status,
                })
            }
            _ => Ok(()),
        }
    }

    /// Operator reset of a sample back to `pending`, detaching it from its chunk
    ///
    /// A planned chunk loses the sample from its members; a submitted
    /// chunk keeps its array layout but no longer owns the sample.
    pub fn admin_reset(&mut self, sample_id: &str, reason: &str) -> Result<SampleStatus> {
        let at = now();
        let previous = self.commit(|state| {
            let sample = state.sample_mut(sample_id)?;
            let from = sample.status;
            sample.status = SampleStatus::Pending;

            let chunk_id = state.assignments.remove(sample_id);
            if let Some(owner) = &chunk_id {
                let chunk = state.chunk_mut(owner)?;
                if chunk.state == ChunkState::Planned {
                    chunk.sample_ids.retain(|id| id != sample_id);
                    chunk.excluded.push(sample_id.to_string());
                }
            }

            state.journal.push(AuditEntry {
                at,
                sample_id: sample_id.to_string(),
                from,
                to: SampleStatus::Pending,
                kind: AuditKind::AdminReset,
                chunk_id,
                reason: Some(reason.to_string()),
            });
            Ok(from)
        })?;

        info!(sample_id = sample_id, from = %previous, reason = reason, "Sample reset by operator");
        Ok(previous)
    }

    /// Apply a scheduler array report to a submitted chunk in one write
    ///
    /// Index `i` maps to the chunk's `i`-th sample. Unreported indices are
    /// left untouched and backward updates are counted as conflicts.
    pub fn apply_array_report(
        &mut self,
        chunk_id: &str,
        report: &ArrayStatusReport,
    ) -> Result<ReportOutcome> {
        let at = now();
        let outcome = self.commit(|state| {
            let chunk = state.chunk_mut(chunk_id)?;
            if chunk.state != ChunkState::Submitted {
                return Err(SchedError::ChunkConflict {
                    chunk_id: chunk_id.to_string(),
                    reason: format!("cannot apply a report to a {} chunk", chunk.state.as_str()),
                });
            }
            let members = chunk.sample_ids.clone();

            let mut outcome = ReportOutcome::default();
            for (&index, task) in &report.tasks {
                let Some(status) = task.sample_status() else {
                    outcome.unchanged += 1;
                    continue;
                };
                let Some(sample_id) = members.get(index) else {
                    outcome.ignored += 1;
                    continue;
                };
                if state.assignments.get(sample_id).map(String::as_str) != Some(chunk_id) {
                    outcome.ignored += 1;
                    continue;
                }

                match state.transition(sample_id, status, Some(chunk_id), None, at)? {
                    Transition::Applied => outcome.updated += 1,
                    Transition::Unchanged => outcome.unchanged += 1,
                    Transition::Rejected(_) => outcome.conflicts += 1,
                }
            }
            Ok(outcome)
        })?;

        debug!(
            chunk_id = chunk_id,
            job_id = %report.job_id,
            updated = outcome.updated,
            conflicts = outcome.conflicts,
            "Applied array report"
        );
        Ok(outcome)
    }

    pub fn status_of(&self, sample_id: &str) -> Result<SampleStatus> {
        self.sample(sample_id)
            .map(|s| s.status)
            .ok_or_else(|| SchedError::UnknownSample(sample_id.to_string()))
    }

    pub fn sample(&self, sample_id: &str) -> Option<&Sample> {
        self.state
            .index
            .get(sample_id)
            .map(|&idx| &self.state.samples[idx])
    }

    /// Samples in manifest order
    pub fn samples(&self) -> &[Sample] {
        &self.state.samples
    }

    /// `pending` samples not owned by a live chunk, in manifest order
    pub fn pending_samples(&self) -> Vec<Sample> {
        self.state
            .samples
            .iter()
            .filter(|s| {
                s.status == SampleStatus::Pending && !self.state.assignments.contains_key(&s.sample_id)
            })
            .cloned()
            .collect()
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&ChunkRecord> {
        self.state.chunks.iter().find(|c| c.chunk_id == chunk_id)
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.state.chunks
    }

    pub fn chunks_in(&self, state: ChunkState) -> Vec<&ChunkRecord> {
        self.state.chunks.iter().filter(|c| c.state == state).collect()
    }

    /// Members of a chunk it still owns, in array-index order
    pub fn chunk_samples(&self, chunk_id: &str) -> Result<Vec<Sample>> {
        let chunk = self
            .chunk(chunk_id)
            .ok_or_else(|| SchedError::UnknownChunk(chunk_id.to_string()))?;
        Ok(chunk
            .sample_ids
            .iter()
            .filter(|id| self.state.assignments.get(*id) == Some(&chunk.chunk_id))
            .filter_map(|id| self.sample(id))
            .cloned()
            .collect())
    }

    /// `pending` samples not yet handed to the scheduler, planned or not
    pub fn unsubmitted_samples(&self) -> Vec<Sample> {
        self.state
            .samples
            .iter()
            .filter(|s| s.status == SampleStatus::Pending)
            .cloned()
            .collect()
    }

    /// Submitted chunks that still have non-terminal members
    pub fn active_chunks(&self) -> Vec<&ChunkRecord> {
        self.state
            .chunks
            .iter()
            .filter(|c| c.state == ChunkState::Submitted)
            .filter(|c| {
                c.sample_ids.iter().any(|id| {
                    self.state.assignments.get(id) == Some(&c.chunk_id)
                        && self.sample(id).is_some_and(|s| !s.status.is_terminal())
                })
            })
            .collect()
    }

    /// Index for the next chunk id; chunk records are never deleted
    pub fn next_chunk_index(&self) -> usize {
        self.state.chunks.len() + 1
    }

    pub fn audit_trail(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn history_of(&self, sample_id: &str) -> Vec<&AuditEntry> {
        self.audit
            .iter()
            .filter(|e| e.sample_id == sample_id)
            .collect()
    }

    pub fn summary(&self) -> TrackerSummary {
        let mut summary = TrackerSummary {
            total_samples: self.state.samples.len(),
            ..TrackerSummary::default()
        };
        for sample in &self.state.samples {
            match sample.status {
                SampleStatus::Pending => {
                    summary.pending += 1;
                    if !self.state.assignments.contains_key(&sample.sample_id) {
                        summary.unassigned += 1;
                    }
                }
                SampleStatus::Submitted => summary.submitted += 1,
                SampleStatus::Running => summary.running += 1,
                SampleStatus::Completed => summary.completed += 1,
                SampleStatus::Failed => summary.failed += 1,
            }
        }
        for chunk in &self.state.chunks {
            match chunk.state {
                ChunkState::Planned => summary.planned_chunks += 1,
                ChunkState::Submitted => summary.submitted_chunks += 1,
                _ => {}
            }
        }
        summary
    }

    /// Rewrite the manifest so its status column matches the tracker
    pub fn sync_manifest(&self, path: &Path) -> Result<()> {
        manifest::write(path, &self.state.samples)?;
        debug!(path = %path.display(), rows = self.state.samples.len(), "Manifest synced");
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
