//! Victim descriptor.

use serde::{Deserialize, Serialize};

/// Activities an operator can attach to a victim.
pub const ACTIVITIES: [&str; 9] = [
    "Aucune",
    "Ski",
    "VTT",
    "Escalade",
    "Randonnée Pédestre",
    "Canyoning",
    "Spéléologie",
    "Parapente",
    "Autre Activité",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub infos_general_physical_condition: String,
    #[serde(default)]
    pub infos_current_health: String,
    #[serde(default)]
    pub may_move: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    #[serde(default)]
    pub worn_clothing: String,
    #[serde(default)]
    pub other_distinctive_features: String,
}

/// What is known about the missing person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Victim {
    #[serde(default)]
    pub victim_id: Option<String>,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub is_caller: Option<bool>,
    #[serde(default)]
    pub activity: Vec<String>,
}

impl Victim {
    #[must_use]
    pub fn new() -> Self {
        Self {
            victim_id: Some(format!("victim_{}", uuid::Uuid::new_v4())),
            ..Self::default()
        }
    }

    /// Activities that are not part of [`ACTIVITIES`].
    #[must_use]
    pub fn unknown_activities(&self) -> Vec<&str> {
        self.activity
            .iter()
            .map(String::as_str)
            .filter(|a| !ACTIVITIES.contains(a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_deserializes() {
        let v: Victim = serde_json::from_str(r#"{"activity": ["Ski", "Luge"]}"#).unwrap();
        assert_eq!(v.activity.len(), 2);
        assert_eq!(v.unknown_activities(), vec!["Luge"]);
        assert!(v.health_status.may_move.is_none());
    }
}
