use serde::{Deserialize, Serialize};
use std::fmt;

/// A food estimate returned by the classifier, not yet logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub portion: String,
}

impl FoodItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            portion: String::new(),
        }
    }

    pub fn with_macros(mut self, calories: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        self.calories = calories;
        self.protein = protein;
        self.carbs = carbs;
        self.fat = fat;
        self
    }

    pub fn with_portion(mut self, portion: impl Into<String>) -> Self {
        self.portion = portion.into();
        self
    }
}

impl fmt::Display for FoodItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} kcal, P:{}g C:{}g F:{}g",
            self.name, self.portion, self.calories, self.protein, self.carbs, self.fat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_food_item_display() {
        let item = FoodItem::new("Banana")
            .with_macros(105.0, 1.3, 27.0, 0.4)
            .with_portion("1 medium");
        assert_eq!(
            item.to_string(),
            "Banana (1 medium): 105 kcal, P:1.3g C:27g F:0.4g"
        );
    }
}
