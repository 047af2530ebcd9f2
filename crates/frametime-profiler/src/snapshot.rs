//! Serializable view of a timer tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::DISPLAY_SEPARATOR;
use crate::timer::TimerKind;
use crate::tree::TimerTree;

/// Measurements of one event, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub name: String,
    /// Full path from the top level, joined with `|`.
    pub path: String,
    /// Nesting depth; top-level events are 0.
    pub depth: usize,
    pub used: bool,
    pub cpu_ms: f64,
    pub cpu_avg_ms: f64,
    /// `None` without GPU timing or before the first result.
    pub gpu_ms: Option<f64>,
    pub gpu_avg_ms: Option<f64>,
}

/// Pre-order listing of every event in a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Resets performed before the snapshot was taken.
    pub frame: u64,
    pub events: Vec<EventSnapshot>,
}

impl TreeSnapshot {
    /// Look up an event by path, using any accepted separator.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&EventSnapshot> {
        let wanted: Vec<&str> = crate::path::segments(path).collect();
        self.events.iter().find(|event| {
            crate::path::segments(&event.path).eq(wanted.iter().copied())
        })
    }
}

impl fmt::Display for TreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<32} {:>9} {:>9} {:>9} {:>9}",
            "event", "cpu ms", "cpu avg", "gpu ms", "gpu avg"
        )?;
        for event in &self.events {
            let label = format!("{:indent$}{}", "", event.name, indent = event.depth * 2);
            writeln!(
                f,
                "{label:<32} {:>9.3} {:>9.3} {:>9} {:>9}",
                event.cpu_ms,
                event.cpu_avg_ms,
                OptMs(event.gpu_ms),
                OptMs(event.gpu_avg_ms),
            )?;
        }
        Ok(())
    }
}

struct OptMs(Option<f64>);

impl fmt::Display for OptMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => f.pad(&format!("{ms:.3}")),
            None => f.pad("-"),
        }
    }
}

impl TimerTree {
    /// Capture every event's current values.
    ///
    /// Collects finished GPU results on the way; with `stall`, waits for
    /// the ones still in flight.
    pub fn snapshot(&mut self, stall: bool) -> TreeSnapshot {
        let mut events = Vec::with_capacity(self.len());
        let mut stack: Vec<(usize, usize, String)> = self
            .children(Self::ROOT)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|index| (index, 0, String::new()))
            .collect();

        while let Some((index, depth, prefix)) = stack.pop() {
            let node = self.node_mut(index);
            let path = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{prefix}{DISPLAY_SEPARATOR}{}", node.name)
            };
            events.push(EventSnapshot {
                name: node.name.clone(),
                path: path.clone(),
                depth,
                used: node.used,
                cpu_ms: node.time(TimerKind::Cpu, false).unwrap_or_default() * 1000.0,
                cpu_avg_ms: node.avg_time(TimerKind::Cpu, false).unwrap_or_default() * 1000.0,
                gpu_ms: node.time(TimerKind::Gpu, stall).map(|s| s * 1000.0),
                gpu_avg_ms: node.avg_time(TimerKind::Gpu, stall).map(|s| s * 1000.0),
            });

            let children: Vec<usize> = self.children(index).collect();
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1, path.clone()));
            }
        }

        TreeSnapshot {
            frame: self.frame(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use approx::assert_relative_eq;

    #[test]
    fn snapshot_lists_events_in_pre_order() {
        let clock = Arc::new(ManualClock::new());
        let mut tree = TimerTree::new().with_clock(clock.clone());
        tree.start("Render");
        tree.start("ZPrepass");
        clock.advance_millis(2);
        tree.stop();
        tree.start("main");
        clock.advance_millis(5);
        tree.stop();
        tree.stop();
        tree.start("UI");
        tree.stop();
        tree.reset(false);

        let snapshot = tree.snapshot(false);
        let paths: Vec<&str> = snapshot.events.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Render", "Render|ZPrepass", "Render|main", "UI"]);
        assert_eq!(snapshot.frame, 1);

        let main = snapshot.get("Render/main").unwrap();
        assert_eq!(main.depth, 1);
        assert!(!main.used);
        assert_relative_eq!(main.cpu_ms, 5.0, epsilon = 1e-9);
        assert_eq!(main.gpu_ms, None);
    }

    #[test]
    fn display_marks_missing_gpu_values() {
        let mut tree = TimerTree::new().with_clock(Arc::new(ManualClock::new()));
        tree.start("Render");
        tree.stop();

        let text = tree.snapshot(false).to_string();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("Render"));
        assert!(row.trim_end().ends_with('-'));
    }
}
