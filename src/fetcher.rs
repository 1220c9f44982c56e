use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::CredentialStore;
use crate::error::{RelayError, Result};
use crate::models::AnnouncementPost;

const OPERATION_NAME: &str = "GetAnnouncementsStudent";

const ANNOUNCEMENTS_QUERY: &str = r#"query GetAnnouncementsStudent($courseClassId: String!) {
  announcements(courseClassId: $courseClassId) {
    courseClassId
    title
    posts {
      id
      title
      content
      publishDate
      modifiedDate
      postStatus
      createdBy {
        id
        user {
          firstName
          lastName
          __typename
        }
        __typename
      }
      resources {
        id
        name
        kind
        type
        __typename
      }
      __typename
    }
    __typename
  }
}
"#;

#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    async fn fetch_new(&self, course_class_id: &str) -> Result<Vec<AnnouncementPost>>;
}

pub struct HaloClient {
    http: reqwest::Client,
    graphql_url: String,
    credentials: Arc<CredentialStore>,
    recency_window: Duration,
}

impl HaloClient {
    pub fn new(
        http: reqwest::Client,
        graphql_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        recency_window: Duration,
    ) -> Self {
        Self {
            http,
            graphql_url: graphql_url.into(),
            credentials,
            recency_window,
        }
    }

    async fn query_posts(&self, course_class_id: &str) -> Result<Vec<Value>> {
        let credentials = self.credentials.current();
        let request = GraphQlRequest {
            operation_name: OPERATION_NAME,
            variables: Variables { course_class_id },
            query: ANNOUNCEMENTS_QUERY,
        };

        let resp = self
            .http
            .post(&self.graphql_url)
            .header("accept", "*/*")
            .header("authorization", format!("Bearer {}", credentials.access_token))
            .header("contexttoken", format!("Bearer {}", credentials.context_token))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(RelayError::Upstream(format!("{} - {}", status, body)));
        }

        parse_posts(&body)
    }
}

#[async_trait]
impl AnnouncementSource for HaloClient {
    async fn fetch_new(&self, course_class_id: &str) -> Result<Vec<AnnouncementPost>> {
        let posts = self.query_posts(course_class_id).await?;
        let total = posts.len();
        let fresh = filter_recent(posts, Utc::now(), self.recency_window, course_class_id);
        tracing::debug!(course = course_class_id, total, fresh = fresh.len(), "Fetched announcements");
        Ok(fresh)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<'a> {
    operation_name: &'a str,
    variables: Variables<'a>,
    query: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    course_class_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<AnnouncementsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct AnnouncementsData {
    announcements: Option<Announcements>,
}

#[derive(Debug, Deserialize)]
struct Announcements {
    #[serde(default)]
    posts: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn parse_posts(body: &str) -> Result<Vec<Value>> {
    let parsed: GraphQlResponse = serde_json::from_str(body)
        .map_err(|err| RelayError::Upstream(format!("announcements response parse failed: {}", err)))?;

    if !parsed.errors.is_empty() {
        let messages = parsed
            .errors
            .iter()
            .map(|err| err.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RelayError::Upstream(format!("graphql errors: {}", messages)));
    }

    parsed
        .data
        .and_then(|data| data.announcements)
        .map(|announcements| announcements.posts.unwrap_or_default())
        .ok_or_else(|| RelayError::Upstream("response missing data.announcements".to_string()))
}

/// Posts published strictly after `now - window`, decoded and tagged with the course.
pub fn filter_recent(
    posts: Vec<Value>,
    now: DateTime<Utc>,
    window: Duration,
    course_class_id: &str,
) -> Vec<AnnouncementPost> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

    posts
        .into_iter()
        .filter(|raw| {
            match raw.get("publishDate").and_then(Value::as_str).and_then(parse_publish_date) {
                Some(published) => published > cutoff,
                None => {
                    tracing::debug!(post_id = %raw.get("id").unwrap_or(&serde_json::Value::Null), "Skipping post without readable publish date");
                    false
                }
            }
        })
        .filter_map(|raw| {
            let post_id = raw.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<AnnouncementPost>(raw) {
                Ok(post) => Some(AnnouncementPost {
                    course_class_id: course_class_id.to_string(),
                    ..post
                }),
                Err(err) => {
                    tracing::warn!(course = course_class_id, post_id = %post_id, error = %err, "Dropping malformed announcement");
                    None
                }
            }
        })
        .collect()
}

fn parse_publish_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // No offset: read as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use crate::test_support::{http_client, serve_once};

    fn post_at(id: &str, publish_date: &str) -> Value {
        json!({ "id": id, "title": id, "content": "", "publishDate": publish_date, "resources": [] })
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:10Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_filter_recent_window_boundary() {
        let window = Duration::from_secs(10);
        let posts = vec![
            post_at("inside", "2024-05-01T12:00:05Z"),
            post_at("just-inside", "2024-05-01T12:00:00.001Z"),
            post_at("boundary", "2024-05-01T12:00:00Z"),
            post_at("old", "2024-05-01T11:59:00Z"),
        ];

        let kept = filter_recent(posts, now(), window, "course-a");
        let ids: Vec<_> = kept.iter().map(|post| post.id.as_str()).collect();

        assert_eq!(ids, vec!["inside", "just-inside"]);
        assert!(kept.iter().all(|post| post.course_class_id == "course-a"));
    }

    #[test]
    fn test_filter_recent_reads_offsets_and_naive_dates() {
        let posts = vec![
            post_at("offset", "2024-05-01T14:00:08+02:00"),
            post_at("naive", "2024-05-01T12:00:09.500"),
            post_at("garbage", "yesterday"),
        ];

        let kept = filter_recent(posts, now(), Duration::from_secs(10), "c");
        let ids: Vec<_> = kept.iter().map(|post| post.id.as_str()).collect();

        assert_eq!(ids, vec!["offset", "naive"]);
    }

    #[test]
    fn test_old_post_with_nulls_does_not_hide_fresh_post() {
        let body = r#"{"data":{"announcements":{"posts":[
            {"id":"old","title":null,"content":null,"publishDate":"2023-01-01T00:00:00Z","createdBy":null,"resources":null},
            {"id":"undated","title":"t","content":"c","publishDate":null,"resources":[]},
            {"id":"fresh","title":"t","content":"c","publishDate":"2024-05-01T12:00:05Z","resources":[]}
        ]}}}"#;

        let posts = parse_posts(body).unwrap();
        let kept = filter_recent(posts, now(), Duration::from_secs(10), "course-a");

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "fresh");
    }

    #[test]
    fn test_fresh_malformed_post_is_dropped_alone() {
        let posts = vec![
            json!({ "publishDate": "2024-05-01T12:00:05Z", "title": "no id" }),
            post_at("fresh", "2024-05-01T12:00:06Z"),
        ];

        let kept = filter_recent(posts, now(), Duration::from_secs(10), "course-a");
        let ids: Vec<_> = kept.iter().map(|post| post.id.as_str()).collect();

        assert_eq!(ids, vec!["fresh"]);
    }

    #[test]
    fn test_parse_posts() {
        let body = r#"{"data":{"announcements":{"posts":[
            {"id":"p1","title":"t","content":"c","publishDate":"2024-05-01T12:00:05Z","resources":[]}
        ]}}}"#;

        let posts = parse_posts(body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["id"], "p1");
        assert!(parse_posts(r#"{"data":{"announcements":{"posts":null}}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_posts_upstream_failures() {
        let errors = r#"{"data":null,"errors":[{"message":"Unauthorized"}]}"#;
        let missing = r#"{"data":{"announcements":null}}"#;

        assert!(matches!(parse_posts(errors), Err(RelayError::Upstream(msg)) if msg.contains("Unauthorized")));
        assert!(matches!(parse_posts(missing), Err(RelayError::Upstream(_))));
        assert!(matches!(parse_posts("<html>"), Err(RelayError::Upstream(_))));
    }

    fn credentials() -> (tempfile::TempDir, Arc<CredentialStore>) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth-token.json");
        fs::write(&path, r#"{"token":"access-1","contexttoken":"context-1"}"#).unwrap();
        let store = Arc::new(CredentialStore::open(&path).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_fetch_new_sends_authenticated_graphql_request() {
        let (_dir, store) = credentials();
        let fresh = Utc::now().to_rfc3339();
        let body = json!({ "data": { "announcements": { "posts": [
            { "id": "fresh", "title": "t", "content": "c", "publishDate": fresh, "resources": [] },
            { "id": "old", "title": "t", "content": "c", "publishDate": "2020-01-01T00:00:00Z", "resources": null }
        ] } } })
        .to_string();
        let (url, server) = serve_once(200, &[], &body).await;
        let client = HaloClient::new(http_client(), url, store, Duration::from_secs(60));

        let posts = client.fetch_new("course-a").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "fresh");
        assert_eq!(posts[0].course_class_id, "course-a");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/");
        assert_eq!(request.header("authorization"), Some("Bearer access-1"));
        assert_eq!(request.header("contexttoken"), Some("Bearer context-1"));
        let sent = request.json();
        assert_eq!(sent["operationName"], "GetAnnouncementsStudent");
        assert_eq!(sent["variables"]["courseClassId"], "course-a");
        assert!(sent["query"].as_str().unwrap().contains("publishDate"));
    }

    #[tokio::test]
    async fn test_fetch_new_maps_rejection_to_auth_expired() {
        let (_dir, store) = credentials();
        let (url, server) = serve_once(401, &[], r#"{"message":"expired"}"#).await;
        let client = HaloClient::new(http_client(), url, store, Duration::from_secs(10));

        let err = client.fetch_new("course-a").await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, RelayError::Upstream(_)));
        assert!(err.is_auth_expired());
    }
}
