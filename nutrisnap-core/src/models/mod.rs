mod food_item;
mod log_entry;
mod macro_goals;
mod profile;

pub use food_item::FoodItem;
pub use log_entry::{fingerprint_set, Fingerprint, LogEntry};
pub use macro_goals::MacroGoals;
pub use profile::{ProfileUpdate, UserProfile};
