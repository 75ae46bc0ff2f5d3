//! Daily macro totals and progress against goals.

use chrono::NaiveDate;
use serde::Serialize;

use crate::clock::local_date;
use crate::models::{LogEntry, MacroGoals};

/// Summed macros of a set of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroTotals {
    pub fn of<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |acc, e| Self {
            calories: acc.calories + e.calories,
            protein: acc.protein + e.protein,
            carbs: acc.carbs + e.carbs,
            fat: acc.fat + e.fat,
        })
    }
}

/// Progress toward one macro goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroProgress {
    pub consumed: f64,
    pub goal: f64,
}

impl MacroProgress {
    /// Percentage of the goal reached, clamped to `0..=100`. A zero goal
    /// reads as 0 %.
    pub fn percent(&self) -> f64 {
        if self.goal <= 0.0 {
            return 0.0;
        }
        (self.consumed / self.goal * 100.0).clamp(0.0, 100.0)
    }

    pub fn remaining(&self) -> f64 {
        (self.goal - self.consumed).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyProgress {
    pub calories: MacroProgress,
    pub protein: MacroProgress,
    pub carbs: MacroProgress,
    pub fat: MacroProgress,
}

impl DailyProgress {
    pub fn new(totals: MacroTotals, goals: &MacroGoals) -> Self {
        Self {
            calories: MacroProgress {
                consumed: totals.calories,
                goal: goals.calories,
            },
            protein: MacroProgress {
                consumed: totals.protein,
                goal: goals.protein,
            },
            carbs: MacroProgress {
                consumed: totals.carbs,
                goal: goals.carbs,
            },
            fat: MacroProgress {
                consumed: totals.fat,
                goal: goals.fat,
            },
        }
    }
}

/// Entries logged on `date` in local time. Entries without a timestamp
/// are always included.
pub fn entries_on_day(entries: &[LogEntry], date: NaiveDate) -> Vec<LogEntry> {
    entries
        .iter()
        .filter(|e| match e.timestamp {
            Some(ts) => local_date(ts) == Some(date),
            None => true,
        })
        .cloned()
        .collect()
}
