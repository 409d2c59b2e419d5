//! Candidate Queue: remaining candidates for one job, strict FIFO

use std::collections::VecDeque;

use crate::job::Candidate;

/// Ordered candidates not yet offered the job.
///
/// Built once from the selection; a popped candidate never comes back.
#[derive(Debug, Clone, Default)]
pub struct CandidateQueue {
    remaining: VecDeque<Candidate>,
}

impl CandidateQueue {
    pub fn new(selection: Vec<Candidate>) -> Self {
        Self {
            remaining: selection.into(),
        }
    }

    /// Remove and return the head, or `None` once drained
    pub fn pop_next(&mut self) -> Option<Candidate> {
        self.remaining.pop_front()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn remaining(&self) -> impl Iterator<Item = &Candidate> {
        self.remaining.iter()
    }
}
