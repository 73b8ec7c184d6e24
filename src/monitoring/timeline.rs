//! Step Timeline
//!
//! Records every step attempt of an instance (start, completion, failure,
//! scheduled retry) for reporting and Gantt-style summaries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step task started
    Started,
    /// Step task returned a value
    Completed,
    /// Step failed and the error was propagated
    Failed,
    /// Step failed inside its retry budget
    Retried,
}

/// A single entry in the step timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Step label
    pub label: String,
    /// Attempt ordinal for this label
    pub attempt: u32,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Ordered record of step attempts for one instance.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a step attempt.
    pub fn add_event(&mut self, label: impl Into<String>, attempt: u32, event_type: EventType) {
        self.events.push(TimelineEvent {
            label: label.into(),
            attempt,
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Counts events of one type for a label.
    pub fn count(&self, label: &str, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|event| event.label == label && event.event_type == event_type)
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the duration of the latest finished attempt of each label.
    pub fn get_durations(&self) -> HashMap<String, Duration> {
        let mut starts: HashMap<(&str, u32), Instant> = HashMap::new();
        let mut durations = HashMap::new();

        for event in &self.events {
            let key = (event.label.as_str(), event.attempt);
            match event.event_type {
                EventType::Started => {
                    starts.insert(key, event.timestamp);
                }
                EventType::Completed | EventType::Failed | EventType::Retried => {
                    if let Some(start) = starts.get(&key) {
                        durations.insert(
                            event.label.clone(),
                            event.timestamp.duration_since(*start),
                        );
                    }
                }
            }
        }

        durations
    }

    /// Renders one line per attempt, scaled to 40 columns.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nStep Timeline:\n\n");

        let total = self.elapsed().as_micros().max(1);
        let scale = 40.0 / total as f64;

        let mut starts: HashMap<(&str, u32), u128> = HashMap::new();
        for event in &self.events {
            let offset = event.timestamp.duration_since(self.start_time).as_micros();
            let key = (event.label.as_str(), event.attempt);

            if event.event_type == EventType::Started {
                starts.insert(key, offset);
                continue;
            }

            let Some(start) = starts.remove(&key) else {
                continue;
            };
            let start_pos = (start as f64 * scale) as usize;
            let width = (((offset - start) as f64) * scale).max(1.0) as usize;
            let marker = match event.event_type {
                EventType::Completed => '#',
                EventType::Retried => 'r',
                _ => 'x',
            };

            output.push_str(&format!(
                "{:20} #{} |{}{}| ({} us)\n",
                truncate(&event.label, 20),
                event.attempt,
                " ".repeat(start_pos),
                marker.to_string().repeat(width),
                offset - start
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", self.elapsed().as_millis()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a label to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
