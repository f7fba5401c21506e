//! Markdown composition for collected items.

use chrono::{DateTime, SecondsFormat, Utc};

use gleaner_output::Frontmatter;
use gleaner_types::{HydratedItem, ItemRef, Result};
use gleaner_utils::sanitize_filename;

/// The `YYYY-MM-DD` folder an item belongs to, from its creation time.
#[must_use]
pub fn date_folder(reference: &ItemRef) -> String {
    reference.created_at.format("%Y-%m-%d").to_string()
}

/// Derive `<date>_<sanitized-title>_<item_id>.md`.
#[must_use]
pub fn item_filename(reference: &ItemRef) -> String {
    format!(
        "{}_{}_{}.md",
        date_folder(reference),
        sanitize_filename(&reference.title),
        sanitize_filename(&reference.id),
    )
}

/// Build the frontmatter + body for a hydrated item.
///
/// Tier-1 fields come from the reference; source-specific metadata is
/// carried over as extra keys and must not collide with Tier-1 names.
pub fn render_item(
    item: &HydratedItem,
    source_tag: &str,
    collected_at: DateTime<Utc>,
) -> Result<(Frontmatter, String)> {
    let reference = &item.reference;

    let mut frontmatter = Frontmatter::new();
    frontmatter.set("title", &reference.title);
    frontmatter.set("source", source_tag);
    frontmatter.set(
        "created_date",
        reference
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    frontmatter.set(
        "collected_date",
        collected_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    if let Some(url) = &reference.url {
        frontmatter.set("url", url);
    }

    if let Some(author) = &reference.author {
        frontmatter.insert_extra("author", author)?;
    }
    if let Some(score) = reference.score {
        frontmatter.insert_extra("score", score.to_string())?;
    }
    for (key, value) in &item.extra_metadata {
        frontmatter.insert_extra(key, value)?;
    }

    frontmatter.validate()?;

    Ok((frontmatter, item.body.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> ItemRef {
        ItemRef {
            id: "msg 42/a".to_string(),
            title: "Hello, World: a Story".to_string(),
            author: Some("ada".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 6, 14, 8, 0, 0).unwrap(),
            score: Some(17),
            url: Some("https://example.com/42".to_string()),
        }
    }

    #[test]
    fn filename_embeds_date_title_and_id() {
        let name = item_filename(&reference());
        assert_eq!(name, "2024-06-14_Hello_World_a_Story_msg_42_a.md");
    }

    #[test]
    fn renders_tier1_and_extras() {
        let item = HydratedItem::new(reference(), "body text");
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();

        let (frontmatter, body) = render_item(&item, "board", now).unwrap();
        assert_eq!(frontmatter.get("title"), Some("Hello, World: a Story"));
        assert_eq!(frontmatter.get("source"), Some("board"));
        assert_eq!(frontmatter.get("created_date"), Some("2024-06-14T08:00:00Z"));
        assert_eq!(frontmatter.get("collected_date"), Some("2024-06-15T09:00:00Z"));
        assert_eq!(frontmatter.get("url"), Some("https://example.com/42"));
        assert_eq!(frontmatter.get("author"), Some("ada"));
        assert_eq!(frontmatter.get("score"), Some("17"));
        assert_eq!(body, "body text");
    }

    #[test]
    fn extra_metadata_collision_is_content_error() {
        let mut item = HydratedItem::new(reference(), "body");
        item.extra_metadata
            .insert("title".to_string(), "shadow".to_string());

        let err = render_item(&item, "board", Utc::now()).unwrap_err();
        assert_eq!(err.code(), "content");
    }

    #[test]
    fn url_is_omitted_when_source_has_none() {
        let mut no_url = reference();
        no_url.url = None;
        let item = HydratedItem::new(no_url, "body");
        let (frontmatter, _) = render_item(&item, "mail", Utc::now()).unwrap();
        assert_eq!(frontmatter.get("url"), None);
    }
}
