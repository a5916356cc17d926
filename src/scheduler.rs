//! Cooperative periodic task scheduler.
//!
//! The scheduler owns no clock. The caller passes the current uptime to
//! [`Scheduler::tick`], which makes every task boundary reproducible in
//! tests by advancing virtual time.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Scheduler::tick(now_ms)                                   │
//! │                                                            │
//! │   due tasks, highest priority first                        │
//! │   ┌─────────────┐  ┌─────────────┐  ┌─────────────┐        │
//! │   │ Maintenance │  │ Sensor      │  │ Indicator   │        │
//! │   │ 2000 ms     │  │ 1000 ms     │  │ 500 ms      │        │
//! │   └──────┬──────┘  └──────┬──────┘  └──────┬──────┘        │
//! │          └────────────────┼────────────────┘               │
//! │                           ▼                                │
//! │                    TaskDelegate::on_task_due               │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! A task that fell more than one period behind runs once and skips the
//! missed activations; each skipped activation counts as an overrun.

use log::{info, warn};

use crate::app::ports::TaskDelegate;
use crate::config::TimingConfig;

/// Slots available for periodic tasks.
const MAX_TASKS: usize = 4;

// ═══════════════════════════════════════════════════════════════
//  Task types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// Toggle the indicator line.
    Indicator,
    /// Sample uptime and publish it.
    Sensor,
    /// Pairing and network session upkeep.
    Maintenance,
}

/// Order among tasks due on the same tick. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Cosmetic = 0,
    Telemetry = 1,
    Maintenance = 2,
}

#[derive(Debug, Clone, Copy)]
pub struct PeriodicTask {
    pub id: TaskId,
    pub label: &'static str,
    pub period_ms: u32,
    pub priority: Priority,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct TaskEntry {
    task: PeriodicTask,
    next_due_ms: u64,
    runs: u32,
    overruns: u32,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

pub struct Scheduler {
    tasks: [Option<TaskEntry>; MAX_TASKS],
    enabled: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: [None; MAX_TASKS],
            enabled: true,
        }
    }

    /// The node's three tasks, first activations one period after `now_ms`.
    pub fn with_node_tasks(timing: &TimingConfig, now_ms: u64) -> Self {
        let mut sched = Self::new();
        let tasks = [
            PeriodicTask {
                id: TaskId::Indicator,
                label: "indicator",
                period_ms: timing.indicator_period_ms,
                priority: Priority::Cosmetic,
                enabled: true,
            },
            PeriodicTask {
                id: TaskId::Sensor,
                label: "sensor",
                period_ms: timing.sensor_period_ms,
                priority: Priority::Telemetry,
                enabled: true,
            },
            PeriodicTask {
                id: TaskId::Maintenance,
                label: "maintenance",
                period_ms: timing.maintenance_period_ms,
                priority: Priority::Maintenance,
                enabled: true,
            },
        ];
        for task in tasks {
            sched.add(task, now_ms);
        }
        sched
    }

    /// Add a task. Returns the slot index, or `None` if full or the
    /// period is zero.
    pub fn add(&mut self, task: PeriodicTask, now_ms: u64) -> Option<usize> {
        if task.period_ms == 0 {
            warn!("Scheduler: '{}' has zero period, not added", task.label);
            return None;
        }
        let slot = self.tasks.iter().position(Option::is_none)?;
        info!(
            "Scheduler: added '{}' every {}ms at slot {}",
            task.label, task.period_ms, slot
        );
        self.tasks[slot] = Some(TaskEntry {
            task,
            next_due_ms: now_ms + u64::from(task.period_ms),
            runs: 0,
            overruns: 0,
        });
        Some(slot)
    }

    /// Enable or disable the entire scheduler.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Enable or disable one task. A re-enabled task is next due one
    /// period after `now_ms`.
    pub fn set_task_enabled(&mut self, id: TaskId, enabled: bool, now_ms: u64) {
        for entry in self.tasks.iter_mut().flatten() {
            if entry.task.id == id {
                if enabled && !entry.task.enabled {
                    entry.next_due_ms = now_ms + u64::from(entry.task.period_ms);
                }
                entry.task.enabled = enabled;
            }
        }
    }

    /// Run every task due at `now_ms`, highest priority first. Returns the
    /// number of activations.
    pub fn tick(&mut self, now_ms: u64, delegate: &mut dyn TaskDelegate) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut due: heapless::Vec<usize, MAX_TASKS> = heapless::Vec::new();
        for (slot, entry) in self.tasks.iter().enumerate() {
            if let Some(e) = entry {
                if e.task.enabled && e.next_due_ms <= now_ms {
                    let _ = due.push(slot);
                }
            }
        }
        // Stable: equal priorities keep slot order.
        due.sort_by(|a, b| self.priority_of(*b).cmp(&self.priority_of(*a)));

        for &slot in &due {
            let Some(entry) = self.tasks[slot].as_mut() else {
                continue;
            };
            delegate.on_task_due(entry.task.id, now_ms);

            let period = u64::from(entry.task.period_ms);
            let missed = (now_ms - entry.next_due_ms) / period;
            if missed > 0 {
                warn!(
                    "Scheduler: '{}' ran {}ms late, skipped {} activation(s)",
                    entry.task.label,
                    now_ms - entry.next_due_ms,
                    missed
                );
                entry.overruns = entry.overruns.saturating_add(missed as u32);
            }
            entry.next_due_ms += (missed + 1) * period;
            entry.runs = entry.runs.wrapping_add(1);
        }
        due.len()
    }

    /// Earliest time any enabled task is due.
    pub fn next_deadline(&self) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        self.tasks
            .iter()
            .flatten()
            .filter(|e| e.task.enabled)
            .map(|e| e.next_due_ms)
            .min()
    }

    /// Skipped activations across all tasks.
    pub fn overruns(&self) -> u32 {
        self.tasks.iter().flatten().map(|e| e.overruns).sum()
    }

    /// Completed activations of one task.
    pub fn runs(&self, id: TaskId) -> u32 {
        self.tasks
            .iter()
            .flatten()
            .filter(|e| e.task.id == id)
            .map(|e| e.runs)
            .sum()
    }

    /// Number of enabled tasks.
    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .flatten()
            .filter(|e| e.task.enabled)
            .count()
    }

    fn priority_of(&self, slot: usize) -> Priority {
        self.tasks[slot]
            .map(|e| e.task.priority)
            .unwrap_or(Priority::Cosmetic)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
