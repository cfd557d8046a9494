//! Core-service profile payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Envelope used by the core service for every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Profile attached to a user, tagged with the kind of record it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Profile {
    Student(StudentProfile),
    Teacher(TeacherProfile),
    Parent(ParentProfile),
}

/// Body of `POST /internal/students`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_core_envelope() {
        let body = r#"{"data":{"id":9,"name":"Bob","dateOfBirth":"2010-05-01","avatarUrl":null}}"#;
        let parsed: ApiResponse<StudentProfile> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.id, 9);
        assert_eq!(
            parsed.data.date_of_birth,
            NaiveDate::from_ymd_opt(2010, 5, 1)
        );
    }

    #[test]
    fn profile_carries_kind_tag() {
        let profile = Profile::Teacher(TeacherProfile {
            id: 3,
            name: "Tran".to_string(),
            email: None,
            phone: None,
            subject: Some("Math".to_string()),
            avatar_url: None,
            status: Some("ACTIVE".to_string()),
        });
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["type"], "TEACHER");
        assert_eq!(json["subject"], "Math");

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
