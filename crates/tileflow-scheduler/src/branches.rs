//! Per-(tenant, branch) FIFO queues
//!
//! Each key holds a FIFO of ready jobs and a `running` flag enforcing the
//! one-running-per-branch rule. Dispatch sweeps iterate keys in insertion
//! order starting from a remembered cursor, so no branch is starved while
//! worker capacity is available.

use std::collections::{HashMap, VecDeque};

use tileflow_core::{BranchKey, JobKey};

#[derive(Debug, Default)]
struct BranchQueue {
    queue: VecDeque<JobKey>,
    running: bool,
}

#[derive(Debug, Default)]
pub struct BranchQueues {
    queues: HashMap<BranchKey, BranchQueue>,
    /// Keys in first-seen order, the basis of the fair sweep
    order: Vec<BranchKey>,
    /// Index into `order` where the next sweep resumes
    cursor: usize,
}

impl BranchQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, key: BranchKey, job: JobKey) {
        if !self.queues.contains_key(&key) {
            self.order.push(key.clone());
            self.queues.insert(key.clone(), BranchQueue::default());
        }
        self.queues
            .get_mut(&key)
            .expect("inserted above")
            .queue
            .push_back(job);
    }

    /// Pop the next job if the key has work and nothing running, atomically
    /// setting the `running` flag
    pub fn take_if_idle(&mut self, key: &BranchKey) -> Option<JobKey> {
        let entry = self.queues.get_mut(key)?;
        if entry.running {
            return None;
        }
        let job = entry.queue.pop_front()?;
        entry.running = true;
        Some(job)
    }

    /// Clear the `running` flag after the branch's job finished
    pub fn mark_done(&mut self, key: &BranchKey) {
        if let Some(entry) = self.queues.get_mut(key) {
            entry.running = false;
        }
    }

    /// Remove a queued job (cancellation); true when it was present
    pub fn remove(&mut self, key: &BranchKey, job: &JobKey) -> bool {
        let Some(entry) = self.queues.get_mut(key) else {
            return false;
        };
        let before = entry.queue.len();
        entry.queue.retain(|queued| queued != job);
        before != entry.queue.len()
    }

    pub fn depth(&self, key: &BranchKey) -> usize {
        self.queues.get(key).map(|e| e.queue.len()).unwrap_or(0)
    }

    pub fn is_running(&self, key: &BranchKey) -> bool {
        self.queues.get(key).map(|e| e.running).unwrap_or(false)
    }

    pub fn total_depth(&self) -> usize {
        self.queues.values().map(|e| e.queue.len()).sum()
    }

    /// Queue depths per key, for the dashboard
    pub fn depths(&self) -> impl Iterator<Item = (&BranchKey, usize)> {
        self.queues.iter().map(|(key, entry)| (key, entry.queue.len()))
    }

    /// Every key once, starting at the cursor
    pub fn rotation(&self) -> Vec<BranchKey> {
        if self.order.is_empty() {
            return Vec::new();
        }
        let start = self.cursor % self.order.len();
        self.order[start..]
            .iter()
            .chain(self.order[..start].iter())
            .cloned()
            .collect()
    }

    /// Remember that a key was served so the next sweep starts after it
    pub fn note_served(&mut self, key: &BranchKey) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.cursor = (position + 1) % self.order.len();
        }
    }

    /// Drop keys that are empty and idle, keeping the cursor stable
    pub fn gc(&mut self) {
        let resume_key = self
            .order
            .get(self.cursor % self.order.len().max(1))
            .cloned();
        self.order.retain(|key| {
            self.queues
                .get(key)
                .map(|entry| entry.running || !entry.queue.is_empty())
                .unwrap_or(false)
        });
        self.queues
            .retain(|_, entry| entry.running || !entry.queue.is_empty());
        self.cursor = resume_key
            .and_then(|key| self.order.iter().position(|k| k == &key))
            .unwrap_or(0);
    }
}
