use std::sync::Arc;

use crate::fetcher::AnnouncementSource;
use crate::formatter::AnnouncementFormatter;
use crate::models::CourseRegistry;
use crate::sender::ChatSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub courses: usize,
    pub fetched: usize,
    pub sent: usize,
    pub fetch_failures: usize,
    pub send_failures: usize,
}

pub struct AnnouncementPoller {
    courses: CourseRegistry,
    source: Arc<dyn AnnouncementSource>,
    formatter: AnnouncementFormatter,
    sink: Arc<dyn ChatSink>,
}

impl AnnouncementPoller {
    pub fn new(
        courses: CourseRegistry,
        source: Arc<dyn AnnouncementSource>,
        formatter: AnnouncementFormatter,
        sink: Arc<dyn ChatSink>,
    ) -> Self {
        Self {
            courses,
            source,
            formatter,
            sink,
        }
    }

    /// Walks the registry in order: fetch, format, send, one course at a time.
    /// Failures are logged and counted; nothing propagates.
    pub async fn tick(&self) -> TickStats {
        let mut stats = TickStats::default();

        for (course_id, code) in self.courses.iter() {
            stats.courses += 1;
            tracing::debug!(course = code, "Getting announcements");

            let posts = match self.source.fetch_new(course_id).await {
                Ok(posts) => posts,
                Err(err) => {
                    stats.fetch_failures += 1;
                    if err.is_auth_expired() {
                        tracing::warn!(course = code, error = %err, "Announcement fetch rejected, credentials may have lapsed");
                    } else {
                        tracing::error!(course = code, error = %err, "Announcement fetch failed");
                    }
                    continue;
                }
            };

            stats.fetched += posts.len();
            if !posts.is_empty() {
                tracing::info!(course = code, count = posts.len(), "Found new announcements");
            }

            for post in &posts {
                let payload = self.formatter.format(post);
                match self.sink.send(&payload).await {
                    Ok(()) => stats.sent += 1,
                    Err(err) => {
                        stats.send_failures += 1;
                        tracing::error!(course = code, post_id = %post.id, error = %err, "Webhook send failed");
                    }
                }
            }
        }

        if stats.fetch_failures > 0 || stats.send_failures > 0 {
            tracing::warn!(
                courses = stats.courses,
                fetched = stats.fetched,
                sent = stats.sent,
                fetch_failures = stats.fetch_failures,
                send_failures = stats.send_failures,
                "Poll tick finished with failures"
            );
        } else {
            tracing::debug!(courses = stats.courses, fetched = stats.fetched, sent = stats.sent, "Poll tick finished");
        }

        stats
    }
}
