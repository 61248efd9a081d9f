use super::{ensure_pending, DelayQueue, QueueOptions};
use crate::error::{JobError, Result};
use async_trait::async_trait;
use doppler_core::{JobRecord, JobStatus};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory delay queue (not persistent, for testing/dev)
///
/// Terminal records are kept for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    options: QueueOptions,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, JobRecord>,
    /// (run_at, request_id), ordered by fire time
    schedule: BTreeSet<(i64, String)>,
    /// request_id -> claim deadline
    claims: HashMap<String, i64>,
}

impl State {
    fn unschedule(&mut self, request_id: &str) -> bool {
        match self.records.get(request_id) {
            Some(record) => self
                .schedule
                .remove(&(record.run_at, request_id.to_string())),
            None => false,
        }
    }

    fn settle(&mut self, job: &JobRecord) {
        self.unschedule(&job.request_id);
        self.claims.remove(&job.request_id);
        self.records.insert(job.request_id.clone(), job.clone());
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: QueueOptions) -> Self {
        Self {
            state: Arc::default(),
            options,
        }
    }

    /// Number of jobs waiting to fire
    pub fn scheduled_len(&self) -> usize {
        self.lock().map(|state| state.schedule.len()).unwrap_or(0)
    }

    /// Number of jobs claimed and not yet acknowledged
    pub fn claimed_len(&self) -> usize {
        self.lock().map(|state| state.claims.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| JobError::BackendError("Lock poisoned".to_string()))
    }
}

#[async_trait]
impl DelayQueue for InMemoryQueue {
    async fn push(&self, job: JobRecord) -> Result<()> {
        ensure_pending(&job)?;
        let mut state = self.lock()?;
        state.unschedule(&job.request_id);
        state.claims.remove(&job.request_id);
        state.schedule.insert((job.run_at, job.request_id.clone()));
        state.records.insert(job.request_id.clone(), job);
        Ok(())
    }

    async fn pop(&self, now: i64) -> Result<Option<JobRecord>> {
        let mut state = self.lock()?;

        loop {
            let due = state
                .schedule
                .first()
                .is_some_and(|(run_at, _)| *run_at <= now);
            if !due {
                return Ok(None);
            }

            let Some((_, id)) = state.schedule.pop_first() else {
                return Ok(None);
            };
            let Some(record) = state.records.get(&id).cloned() else {
                continue;
            };
            if record.status != JobStatus::Pending {
                continue;
            }

            state
                .claims
                .insert(id, now.saturating_add(self.options.claim_secs()));
            return Ok(Some(record));
        }
    }

    async fn complete(&self, job: &JobRecord) -> Result<()> {
        self.lock()?.settle(job);
        Ok(())
    }

    async fn fail(&self, job: &JobRecord) -> Result<()> {
        self.lock()?.settle(job);
        Ok(())
    }

    async fn requeue_expired(&self, now: i64) -> Result<usize> {
        let mut state = self.lock()?;
        let expired: Vec<String> = state
            .claims
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut requeued = 0;
        for id in expired {
            state.claims.remove(&id);
            let Some(run_at) = state
                .records
                .get(&id)
                .filter(|record| record.status == JobStatus::Pending)
                .map(|record| record.run_at)
            else {
                continue;
            };
            state.schedule.insert((run_at, id));
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn cancel(&self, request_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.unschedule(request_id) {
            return Ok(false);
        }
        if let Some(record) = state.records.get_mut(request_id) {
            record.mark_cancelled()?;
        }
        Ok(true)
    }

    async fn get(&self, request_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.lock()?.records.get(request_id).cloned())
    }
}
