use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily macro targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MacroGoals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroGoals {
    pub fn new(calories: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
        }
    }
}

impl Default for MacroGoals {
    fn default() -> Self {
        Self::new(2000.0, 150.0, 250.0, 65.0)
    }
}

impl fmt::Display for MacroGoals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kcal, protein {} g, carbs {} g, fat {} g",
            self.calories, self.protein, self.carbs, self.fat
        )
    }
}
