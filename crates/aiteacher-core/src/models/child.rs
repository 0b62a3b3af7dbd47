use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A child's learning profile as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub grade: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub learning_style: Option<String>,
    #[serde(default)]
    pub preferences: Option<Map<String, Value>>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Child {
    /// Subjects as a single comma-separated line
    pub fn subjects_display(&self) -> String {
        if self.subjects.is_empty() {
            "-".to_string()
        } else {
            self.subjects.join(", ")
        }
    }
}

/// Payload for creating a child profile
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewChild {
    pub name: String,
    pub grade: String,
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_style: Option<String>,
    pub preferences: Map<String, Value>,
}

impl NewChild {
    pub fn new(name: impl Into<String>, grade: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            grade: grade.into(),
            subjects,
            ..Default::default()
        }
    }

    pub fn with_learning_style(mut self, style: impl Into<String>) -> Self {
        self.learning_style = Some(style.into());
        self
    }

    /// Required-field check. Returns the first problem found.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("Name is required")
        } else if self.grade.trim().is_empty() {
            Some("Grade is required")
        } else if self.subjects.iter().all(|s| s.trim().is_empty()) {
            Some("At least one subject must be specified")
        } else {
            None
        }
    }
}
