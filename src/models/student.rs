use serde::{Deserialize, Serialize};

/// Student profile returned by `/api/students/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "beltRank")]
    pub belt_rank: Option<String>,
    #[serde(rename = "schoolId")]
    pub school_id: Option<String>,
    #[serde(rename = "joinedAt")]
    pub joined_at: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name.to_string()
        }
    }

    pub fn display_belt(&self) -> String {
        self.belt_rank
            .clone()
            .unwrap_or_else(|| "Unranked".to_string())
    }
}

/// One advancement entry in a student's progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<String>,
}

/// Progress record returned by `/api/progress/student/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    #[serde(rename = "currentBelt")]
    pub current_belt: Option<String>,
    #[serde(rename = "nextBelt")]
    pub next_belt: Option<String>,
    #[serde(rename = "progressPercent")]
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub entries: Vec<ProgressEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_fallback() {
        let json = r#"{"_id": "s1"}"#;
        let student: Student = serde_json::from_str(json).expect("Failed to parse student");
        assert_eq!(student.full_name(), "Unknown");
        assert_eq!(student.display_belt(), "Unranked");
    }

    #[test]
    fn test_parse_progress() {
        let json = r#"{
            "currentBelt": "Blue",
            "nextBelt": "Red",
            "progressPercent": 62.5,
            "entries": [
                {"name": "Poomsae 4", "status": "completed", "completedAt": "2026-01-12"},
                {"name": "Sparring assessment", "status": "pending"}
            ]
        }"#;

        let progress: StudentProgress =
            serde_json::from_str(json).expect("Failed to parse progress");
        assert_eq!(progress.current_belt.as_deref(), Some("Blue"));
        assert_eq!(progress.entries.len(), 2);
        assert_eq!(progress.entries[1].completed_at, None);
    }
}
