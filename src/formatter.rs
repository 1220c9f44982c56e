use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::models::{AnnouncementPost, ChatPayload, CourseRegistry, Embed, EmbedField};

// Matches unterminated tags at end of input too.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+(>|$)").unwrap());

/// Plain-text reduction of Halo's post markup. Not an HTML parser: `<br>`
/// becomes a newline and anything tag-shaped is dropped.
pub fn strip_markup(content: &str) -> String {
    let with_breaks = content.replace("<br>", "\n");
    TAG_RE.replace_all(&with_breaks, "").into_owned()
}

#[derive(Debug, Clone)]
pub struct AnnouncementFormatter {
    courses: CourseRegistry,
    resource_base_url: String,
    embed_color: u32,
}

impl AnnouncementFormatter {
    pub fn new(courses: CourseRegistry, resource_base_url: impl Into<String>, embed_color: u32) -> Self {
        Self {
            courses,
            resource_base_url: resource_base_url.into(),
            embed_color,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.courses.clone(), config.resource_base_url.clone(), config.embed_color)
    }

    pub fn format(&self, post: &AnnouncementPost) -> ChatPayload {
        let code = self.courses.display_code(&post.course_class_id);

        let mut fields = vec![EmbedField {
            name: "Message".to_string(),
            value: strip_markup(&post.content),
        }];

        if !post.resources.is_empty() {
            fields.push(EmbedField {
                name: format!("Attachments ({})", post.resources.len()),
                value: post
                    .resources
                    .iter()
                    .map(|resource| format!("[`{}`]({}/{})", resource.name, self.resource_base_url, resource.id))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        ChatPayload {
            content: format!("New Announcement posted for **{}**", code),
            embeds: vec![Embed {
                color: self.embed_color,
                title: post.title.clone(),
                description: format!("by {}", post.author_name()),
                fields,
                timestamp: post.publish_date.clone(),
            }],
        }
    }
}
