use serde::{Deserialize, Serialize};

use super::macro_goals::MacroGoals;

/// Per-user profile kept by the remote store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub macro_goals: Option<MacroGoals>,
}

impl UserProfile {
    /// Merges the fields present in `update`, leaving the rest untouched.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(goals) = update.macro_goals {
            self.macro_goals = Some(goals);
        }
    }
}

/// A partial profile write. Absent fields are left as stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_goals: Option<MacroGoals>,
}

impl ProfileUpdate {
    pub fn email(email: Option<String>) -> Self {
        Self {
            email,
            macro_goals: None,
        }
    }

    pub fn goals(goals: MacroGoals) -> Self {
        Self {
            email: None,
            macro_goals: Some(goals),
        }
    }
}
