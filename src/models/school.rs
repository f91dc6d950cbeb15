use serde::{Deserialize, Serialize};

/// Geographic coordinate attached to a school listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Weekly opening hours for a school.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "openingTime")]
    pub opening_time: String,
    #[serde(rename = "closingTime")]
    pub closing_time: String,
    #[serde(rename = "operatingDays", default)]
    pub operating_days: Vec<String>,
}

/// Headline counts shown on a school listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolDashboard {
    #[serde(rename = "studentCount", default)]
    pub student_count: i64,
    #[serde(rename = "instructorCount")]
    pub instructor_count: Option<i64>,
    #[serde(rename = "classCount")]
    pub class_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct School {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "contactNumber")]
    pub contact_number: Option<String>,
    pub schedule: Option<Schedule>,
    pub dashboard: Option<SchoolDashboard>,
    pub instructors: Option<Vec<String>>,
    pub students: Option<Vec<String>>,
    #[serde(rename = "martialArts")]
    pub martial_arts: Option<Vec<String>>,
    pub location: Option<GeoPoint>,
}

impl School {
    pub fn display_student_count(&self) -> String {
        match self.dashboard.as_ref().map(|d| d.student_count) {
            Some(count) => format!("{} students", count),
            None => "Unknown".to_string(),
        }
    }

    /// Disciplines taught, comma-separated.
    pub fn display_martial_arts(&self) -> String {
        match self.martial_arts.as_deref() {
            Some(arts) if !arts.is_empty() => arts.join(", "),
            _ => "Not listed".to_string(),
        }
    }

    pub fn display_schedule(&self) -> String {
        match self.schedule.as_ref() {
            Some(s) if s.operating_days.is_empty() => {
                format!("{} - {}", s.opening_time, s.closing_time)
            }
            Some(s) => format!(
                "{} - {} ({})",
                s.opening_time,
                s.closing_time,
                s.operating_days.join(", ")
            ),
            None => "No schedule listed".to_string(),
        }
    }
}

/// Create payload: a school listing without its server-assigned id.
#[derive(Debug, Clone, Serialize)]
pub struct NewSchool {
    pub name: String,
    pub address: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(rename = "contactNumber", skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(rename = "martialArts", skip_serializing_if = "Option::is_none")]
    pub martial_arts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Partial update payload; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchoolUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "contactNumber", skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(rename = "martialArts", skip_serializing_if = "Option::is_none")]
    pub martial_arts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_school_listing() {
        let json = r#"{
            "_id": "65f0a1",
            "name": "Golden Tiger Dojang",
            "address": "12 Rue des Arts, Paris",
            "description": "Taekwondo and hapkido",
            "images": ["a.jpg", "b.jpg"],
            "contactNumber": "5551234567",
            "schedule": {
                "openingTime": "09:00",
                "closingTime": "21:00",
                "operatingDays": ["Mon", "Wed", "Fri"]
            },
            "dashboard": { "studentCount": 42, "instructorCount": 3 },
            "martialArts": ["Taekwondo", "Hapkido"],
            "location": { "latitude": 48.8566, "longitude": 2.3522 }
        }"#;

        let school: School = serde_json::from_str(json).expect("Failed to parse school JSON");
        assert_eq!(school.id, "65f0a1");
        assert_eq!(school.display_student_count(), "42 students");
        assert_eq!(school.display_martial_arts(), "Taekwondo, Hapkido");
        assert_eq!(school.display_schedule(), "09:00 - 21:00 (Mon, Wed, Fri)");
        let location = school.location.expect("school has a location");
        assert!((location.latitude - 48.8566).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_sparse_school() {
        // Listings created before the schema grew only carry id and name.
        let json = r#"{"_id": "1", "name": "Old Dojo"}"#;
        let school: School = serde_json::from_str(json).expect("Failed to parse sparse school");
        assert_eq!(school.display_student_count(), "Unknown");
        assert_eq!(school.display_martial_arts(), "Not listed");
        assert_eq!(school.display_schedule(), "No schedule listed");
        assert!(school.images.is_empty());
    }

    #[test]
    fn test_school_update_skips_unset_fields() {
        let update = SchoolUpdate {
            name: Some("New Name".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).expect("Failed to serialize update");
        assert_eq!(json, r#"{"name":"New Name"}"#);
    }
}
