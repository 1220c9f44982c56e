use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseRegistry {
    courses: Vec<(String, String)>,
}

impl CourseRegistry {
    pub fn new(courses: Vec<(String, String)>) -> Self {
        Self { courses }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut courses: Vec<(String, String)> = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (id, code) = entry
                .split_once('=')
                .ok_or_else(|| RelayError::Config(format!("course entry `{}` is not id=CODE", entry)))?;
            let (id, code) = (id.trim(), code.trim());
            if id.is_empty() || code.is_empty() {
                return Err(RelayError::Config(format!("course entry `{}` is incomplete", entry)));
            }
            if courses.iter().any(|(existing, _)| existing == id) {
                return Err(RelayError::Config(format!("course id `{}` listed twice", id)));
            }
            courses.push((id.to_string(), code.to_string()));
        }
        if courses.is_empty() {
            return Err(RelayError::Config("no courses configured".to_string()));
        }
        Ok(Self::new(courses))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.courses.iter().map(|(id, code)| (id.as_str(), code.as_str()))
    }

    /// Course code for display; unknown ids fall back to the id itself.
    pub fn display_code<'a>(&'a self, course_class_id: &'a str) -> &'a str {
        self.courses
            .iter()
            .find(|(id, _)| id == course_class_id)
            .map(|(_, code)| code.as_str())
            .unwrap_or(course_class_id)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }
}

/// Token material needed to talk to Halo. Older blobs used different key
/// names, all of which are still accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "token", alias = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "contexttoken", alias = "contextToken", alias = "context_token")]
    pub context_token: String,
    #[serde(rename = "cookies", alias = "sessionCookies", alias = "session_cookies", default)]
    pub session_cookies: BTreeMap<String, String>,
}

impl CredentialPair {
    pub fn cookie_header(&self) -> Option<String> {
        if self.session_cookies.is_empty() {
            return None;
        }
        Some(
            self.session_cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

// Halo sends explicit nulls for empty fields.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedBy {
    #[serde(default)]
    pub user: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Raw announcement as returned by `GetAnnouncementsStudent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementPost {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    pub publish_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_by: CreatedBy,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<Resource>,
    // Filled in by the fetcher.
    #[serde(default, deserialize_with = "null_as_default")]
    pub course_class_id: String,
}

impl AnnouncementPost {
    pub fn author_name(&self) -> String {
        match &self.created_by.user {
            Some(user) => format!("{} {}", user.first_name, user.last_name).trim().to_string(),
            None => "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub color: u32,
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}
