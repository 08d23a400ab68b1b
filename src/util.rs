//! Small helpers shared by the processing pipeline: a request deadline and
//! the transcript built once per request.

use std::time::{Duration, Instant};

use crate::ThreadMessage;

/// Request budget measured from the moment the request entered the
/// orchestrator.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn starting_at(start: Instant, budget: Duration) -> Self {
        Deadline { start, budget }
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.start.elapsed())
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget.as_millis() as u64
    }
}

/// Prompt text and participant list derived from a thread in one pass.
#[derive(Clone, Debug)]
pub struct Transcript {
    /// One `sender: text (timestamp)` line per message.
    pub text: String,
    /// Distinct senders in first-seen order.
    pub participants: Vec<String>,
}

impl Transcript {
    pub fn from_thread(thread: &[ThreadMessage]) -> Self {
        let mut lines = Vec::with_capacity(thread.len());
        let mut participants: Vec<String> = Vec::new();
        for msg in thread {
            match &msg.timestamp {
                Some(ts) => lines.push(format!("{}: {} ({})", msg.sender, msg.text, ts)),
                None => lines.push(format!("{}: {}", msg.sender, msg.text)),
            }
            if !participants.iter().any(|p| p == &msg.sender) {
                participants.push(msg.sender.clone());
            }
        }
        Transcript {
            text: lines.join("\n"),
            participants,
        }
    }
}
