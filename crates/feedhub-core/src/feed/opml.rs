use std::collections::HashSet;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::models::NewFeed;
use crate::{Error, Result};

/// Read an OPML subscription list from disk
pub fn parse_opml_file(path: &Path) -> Result<Vec<NewFeed>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content)
}

/// Extract feed registrations from OPML.
///
/// Outlines without `xmlUrl` are categories and are skipped. Names are
/// taken from `title`, then `text`, then the URL itself; the first
/// occurrence of a name or URL wins.
pub fn parse_opml(content: &str) -> Result<Vec<NewFeed>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_urls = HashSet::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if let Some(feed) = outline_to_feed(&e)? {
                    if seen_names.insert(feed.name.clone()) && seen_urls.insert(feed.url.clone()) {
                        feeds.push(feed);
                    } else {
                        tracing::debug!("Skipping duplicate OPML outline: {}", feed.name);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!("Failed to parse OPML: {}", e)));
            }
            _ => {}
        }
    }

    Ok(feeds)
}

fn outline_to_feed(e: &BytesStart<'_>) -> Result<Option<NewFeed>> {
    let mut url = None;
    let mut title = None;
    let mut text = None;

    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map_err(|e| Error::FeedParse(format!("Bad OPML attribute: {}", e)))?
            .trim()
            .to_string();
        if value.is_empty() {
            continue;
        }
        match attr.key.as_ref() {
            b"xmlUrl" => url = Some(value),
            b"title" => title = Some(value),
            b"text" => text = Some(value),
            _ => {}
        }
    }

    Ok(url.map(|url| NewFeed {
        name: title.or(text).unwrap_or_else(|| url.clone()),
        url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opml_nested_outlines() {
        let opml = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Tech">
      <outline text="tc" title="tech-crunch" xmlUrl="https://techcrunch.com/feed/" type="rss"/>
      <outline text="Hacker &amp; News" xmlUrl="https://news.ycombinator.com/rss" type="rss"/>
    </outline>
    <outline xmlUrl="https://example.com/feed.xml" type="rss"/>
  </body>
</opml>"#;

        let feeds = parse_opml(opml).unwrap();
        assert_eq!(feeds.len(), 3);
        assert_eq!(feeds[0].name, "tech-crunch");
        assert_eq!(feeds[0].url, "https://techcrunch.com/feed/");
        assert_eq!(feeds[1].name, "Hacker & News");
        assert_eq!(feeds[2].name, "https://example.com/feed.xml");
    }

    #[test]
    fn test_parse_opml_skips_duplicates() {
        let opml = r#"<opml version="2.0"><body>
    <outline text="a" xmlUrl="https://example.com/1"/>
    <outline text="a" xmlUrl="https://example.com/2"/>
    <outline text="b" xmlUrl="https://example.com/1"/>
    <outline text="Empty Category"/>
</body></opml>"#;

        let feeds = parse_opml(opml).unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url, "https://example.com/1");
    }
}
