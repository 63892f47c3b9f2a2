use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::models::{ChannelMeta, ParsedFeed, RawItem};
use crate::{Error, Result};

/// Parse RSS 2.0, RSS 1.0 or Atom content into channel metadata and raw items.
///
/// Empty input and anything that is not a single well-formed XML element tree
/// is rejected with [`Error::FeedParse`]. Only the five XML entities and
/// character references are accepted; HTML entities such as `&nbsp;` must be
/// escaped or wrapped in CDATA like any other markup.
///
/// Text is kept as written (including whitespace around CDATA sections) and
/// trimmed once per field.
pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::FeedParse("Empty document".to_string()));
    }

    let mut reader = Reader::from_reader(content);

    let mut state = ParseState::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::FeedParse(format!(
                "Malformed XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) => state.open(&e, false)?,
            Event::Empty(e) => state.open(&e, true)?,
            Event::End(_) => state.close()?,
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| {
                    Error::FeedParse(format!(
                        "Malformed text before byte {}: {}",
                        reader.buffer_position(),
                        err
                    ))
                })?;
                state.text(&text)?;
            }
            Event::CData(e) => state.text(&String::from_utf8_lossy(&e))?,
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    Title,
    Link,
    Description,
    Summary,
    PubDate,
    DcDate,
    Published,
    Updated,
    Encoded,
    AtomContent,
    VendorUrl,
}

struct Capture {
    field: Field,
    level: usize,
    text: String,
}

#[derive(Default)]
struct ItemState {
    level: usize,
    item: RawItem,
    summary: Option<String>,
    dc_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    atom_content: Option<String>,
    media_content: Option<String>,
    vendor_level: Option<usize>,
}

impl ItemState {
    fn into_item(self) -> RawItem {
        let mut item = self.item;
        item.description = item.description.or(self.summary);
        item.pub_date = item
            .pub_date
            .or(self.dc_date)
            .or(self.published)
            .or(self.updated);
        item.content_encoded = item.content_encoded.or(self.atom_content);
        item.media_thumbnail = item.media_thumbnail.or(self.media_content);
        item
    }
}

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    seen_root: bool,
    root_closed: bool,
    channel: ChannelMeta,
    items: Vec<RawItem>,
    current: Option<ItemState>,
    capture: Option<Capture>,
}

impl ParseState {
    fn open(&mut self, e: &BytesStart, is_empty: bool) -> Result<()> {
        if self.root_closed {
            return Err(Error::FeedParse(
                "Content after the root element".to_string(),
            ));
        }
        self.seen_root = true;
        check_attributes(e)?;

        let name = e.name();
        let local = String::from_utf8_lossy(name.local_name().as_ref()).into_owned();
        let prefixed = name.prefix().is_some();
        let level = self.stack.len() + 1;
        let parent = self.stack.last().map(String::as_str);

        let starts_item = !prefixed && (local == "item" || local == "entry");
        let field = if self.current.is_none() && starts_item {
            self.current = Some(ItemState {
                level,
                ..ItemState::default()
            });
            None
        } else if let Some(state) = self.current.as_mut() {
            item_field(state, e, &local, prefixed, level)?
        } else {
            channel_field(&mut self.channel, e, &local, prefixed, parent, level)?
        };

        if is_empty {
            // Self-closing: nothing to capture and nothing to pop later
            if let Some(state) = self.current.as_mut() {
                if state.vendor_level == Some(level) {
                    state.vendor_level = None;
                }
                if state.level == level {
                    if let Some(state) = self.current.take() {
                        self.items.push(state.into_item());
                    }
                }
            }
            if level == 1 {
                self.root_closed = true;
            }
            return Ok(());
        }

        if let (Some(field), None) = (field, self.capture.as_ref()) {
            self.capture = Some(Capture {
                field,
                level,
                text: String::new(),
            });
        }
        self.stack.push(local);
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::FeedParse(
                "Text outside of the root element".to_string(),
            ));
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let level = self.stack.len();
        if self.stack.pop().is_none() {
            return Err(Error::FeedParse("Unmatched end tag".to_string()));
        }

        if self.capture.as_ref().is_some_and(|c| c.level == level) {
            if let Some(capture) = self.capture.take() {
                self.commit(capture);
            }
        }

        if let Some(state) = self.current.as_mut() {
            if state.vendor_level == Some(level) {
                state.vendor_level = None;
            }
            if state.level == level {
                if let Some(state) = self.current.take() {
                    self.items.push(state.into_item());
                }
            }
        }

        if self.stack.is_empty() {
            self.root_closed = true;
        }
        Ok(())
    }

    fn commit(&mut self, capture: Capture) {
        let text = capture.text;
        let slot = match (capture.field, self.current.as_mut()) {
            (Field::ChannelTitle, _) => &mut self.channel.title,
            (Field::ChannelLink, _) => &mut self.channel.link,
            (Field::ChannelDescription, _) => &mut self.channel.description,
            (_, None) => return,
            (Field::Title, Some(s)) => &mut s.item.title,
            (Field::Link, Some(s)) => &mut s.item.link,
            (Field::Description, Some(s)) => &mut s.item.description,
            (Field::Summary, Some(s)) => &mut s.summary,
            (Field::PubDate, Some(s)) => &mut s.item.pub_date,
            (Field::DcDate, Some(s)) => &mut s.dc_date,
            (Field::Published, Some(s)) => &mut s.published,
            (Field::Updated, Some(s)) => &mut s.updated,
            (Field::Encoded, Some(s)) => &mut s.item.content_encoded,
            (Field::AtomContent, Some(s)) => &mut s.atom_content,
            (Field::VendorUrl, Some(s)) => &mut s.item.vendor_image,
        };
        set_once(slot, &text);
    }

    fn finish(self) -> Result<ParsedFeed> {
        if !self.seen_root {
            return Err(Error::FeedParse("No root element".to_string()));
        }
        if !self.stack.is_empty() {
            return Err(Error::FeedParse(format!(
                "Unexpected end of document inside <{}>",
                self.stack.join("><")
            )));
        }

        Ok(ParsedFeed {
            channel: self.channel,
            items: self.items,
        })
    }
}

fn channel_field(
    channel: &mut ChannelMeta,
    e: &BytesStart,
    local: &str,
    prefixed: bool,
    parent: Option<&str>,
    level: usize,
) -> Result<Option<Field>> {
    // RSS keeps metadata under <channel>, Atom directly under the root <feed>
    let in_channel = parent == Some("channel") || (parent == Some("feed") && level == 2);
    if prefixed || !in_channel {
        return Ok(None);
    }

    let field = match local {
        "title" => Some(Field::ChannelTitle),
        "link" => match attr(e, b"href")? {
            Some(href) => {
                if is_alternate(e)? {
                    set_once(&mut channel.link, &href);
                }
                None
            }
            None => Some(Field::ChannelLink),
        },
        "description" | "subtitle" => Some(Field::ChannelDescription),
        _ => None,
    };
    Ok(field)
}

fn item_field(
    state: &mut ItemState,
    e: &BytesStart,
    local: &str,
    prefixed: bool,
    level: usize,
) -> Result<Option<Field>> {
    // Media and enclosure elements may sit inside wrappers such as <media:group>
    if prefixed {
        match local {
            "thumbnail" => {
                if let Some(url) = attr(e, b"url")? {
                    set_once(&mut state.item.media_thumbnail, &url);
                }
            }
            "content" => {
                if let Some(url) = attr(e, b"url")? {
                    set_once(&mut state.media_content, &url);
                }
            }
            "image" if state.vendor_level.is_none() => state.vendor_level = Some(level),
            _ => {}
        }
    }

    if local == "url" && state.vendor_level.is_some() {
        return Ok(Some(Field::VendorUrl));
    }

    if local == "enclosure" && !prefixed {
        if let Some(url) = attr(e, b"url")? {
            set_once(&mut state.item.enclosure_url, &url);
        }
        return Ok(None);
    }

    if level != state.level + 1 {
        return Ok(None);
    }

    if prefixed {
        return Ok(match local {
            "encoded" => Some(Field::Encoded),
            "date" => Some(Field::DcDate),
            _ => None,
        });
    }

    let field = match local {
        "title" => Some(Field::Title),
        "link" => match attr(e, b"href")? {
            Some(href) => {
                match attr(e, b"rel")?.as_deref() {
                    Some("enclosure") => set_once(&mut state.item.enclosure_url, &href),
                    None | Some("alternate") => set_once(&mut state.item.link, &href),
                    _ => {}
                }
                None
            }
            None => Some(Field::Link),
        },
        "description" => Some(Field::Description),
        "summary" => Some(Field::Summary),
        "pubDate" => Some(Field::PubDate),
        "published" => Some(Field::Published),
        "updated" => Some(Field::Updated),
        "content" => Some(Field::AtomContent),
        _ => None,
    };
    Ok(field)
}

fn is_alternate(e: &BytesStart) -> Result<bool> {
    Ok(matches!(attr(e, b"rel")?.as_deref(), None | Some("alternate")))
}

/// Value of an attribute by local name, entity-unescaped
fn attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(malformed_attribute)?;
        if attribute.key.local_name().as_ref() == name {
            let value = attribute.unescape_value().map_err(malformed_attribute)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Reject unquoted, duplicated or badly escaped attributes on any element
fn check_attributes(e: &BytesStart) -> Result<()> {
    for attribute in e.attributes() {
        attribute
            .map_err(malformed_attribute)?
            .unescape_value()
            .map_err(malformed_attribute)?;
    }
    Ok(())
}

fn malformed_attribute(err: impl fmt::Display) -> Error {
    Error::FeedParse(format!("Malformed attribute: {}", err))
}

/// Store a trimmed, non-empty value unless the slot is already filled
fn set_once(slot: &mut Option<String>, value: &str) {
    let value = value.trim();
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:media="http://search.yahoo.com/mrss/"
     xmlns:szn="https://www.seznam.cz">
  <channel>
    <title>Example News</title>
    <link>https://www.example.org/</link>
    <description>All the news</description>
    <item>
      <title>First &amp; foremost</title>
      <link>https://www.example.org/first</link>
      <description><![CDATA[<p>Hello <img src="https://img.example.org/d.jpg"></p>]]></description>
      <pubDate>Tue, 10 Jun 2003 04:00:00 GMT</pubDate>
      <content:encoded><![CDATA[<img src="https://img.example.org/c.jpg">]]></content:encoded>
      <media:thumbnail url="https://img.example.org/m.jpg" width="150"/>
      <enclosure url="https://img.example.org/e.jpg" type="image/jpeg" length="1"/>
      <szn:image><szn:url>https://img.example.org/v.jpg</szn:url></szn:image>
      <source url="https://elsewhere.example/rss"><title>Elsewhere</title></source>
    </item>
    <item>
      <title>Second</title>
      <link>https://www.example.org/second</link>
      <description>&lt;img src="https://img.example.org/escaped.jpg"&gt;</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss2() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();

        assert_eq!(feed.channel.title.as_deref(), Some("Example News"));
        assert_eq!(feed.channel.link.as_deref(), Some("https://www.example.org/"));
        assert_eq!(feed.channel.description.as_deref(), Some("All the news"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title.as_deref(), Some("First & foremost"));
        assert_eq!(first.link.as_deref(), Some("https://www.example.org/first"));
        assert_eq!(
            first.description.as_deref(),
            Some(r#"<p>Hello <img src="https://img.example.org/d.jpg"></p>"#)
        );
        assert_eq!(first.pub_date.as_deref(), Some("Tue, 10 Jun 2003 04:00:00 GMT"));
        assert_eq!(
            first.content_encoded.as_deref(),
            Some(r#"<img src="https://img.example.org/c.jpg">"#)
        );
        assert_eq!(first.media_thumbnail.as_deref(), Some("https://img.example.org/m.jpg"));
        assert_eq!(first.enclosure_url.as_deref(), Some("https://img.example.org/e.jpg"));
        assert_eq!(first.vendor_image.as_deref(), Some("https://img.example.org/v.jpg"));

        let second = &feed.items[1];
        assert_eq!(second.pub_date, None);
        assert_eq!(
            second.description.as_deref(),
            Some(r#"<img src="https://img.example.org/escaped.jpg">"#)
        );
        assert_eq!(second.media_thumbnail, None);
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://atom.example.org/" rel="alternate"/>
  <link href="https://atom.example.org/feed" rel="self"/>
  <entry>
    <title>Entry one</title>
    <link rel="alternate" href="https://atom.example.org/one"/>
    <link rel="enclosure" href="https://atom.example.org/one.png"/>
    <published>2024-03-01T08:30:00-05:00</published>
    <updated>2024-03-02T08:30:00-05:00</updated>
    <summary>Short</summary>
    <content type="html">&lt;p&gt;Long&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Entry two</title>
    <link href="https://atom.example.org/two"/>
    <updated>2024-03-03T10:00:00Z</updated>
  </entry>
</feed>"#;

        let feed = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(feed.channel.title.as_deref(), Some("Atom Example"));
        assert_eq!(feed.channel.link.as_deref(), Some("https://atom.example.org/"));
        assert_eq!(feed.items.len(), 2);

        let one = &feed.items[0];
        assert_eq!(one.link.as_deref(), Some("https://atom.example.org/one"));
        assert_eq!(one.enclosure_url.as_deref(), Some("https://atom.example.org/one.png"));
        assert_eq!(one.pub_date.as_deref(), Some("2024-03-01T08:30:00-05:00"));
        assert_eq!(one.description.as_deref(), Some("Short"));
        assert_eq!(one.content_encoded.as_deref(), Some("<p>Long</p>"));

        let two = &feed.items[1];
        assert_eq!(two.link.as_deref(), Some("https://atom.example.org/two"));
        assert_eq!(two.pub_date.as_deref(), Some("2024-03-03T10:00:00Z"));
    }

    #[test]
    fn test_parse_rss1_dc_date() {
        let rdf = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://rdf.example.org/">
    <title>RDF Example</title>
  </channel>
  <item rdf:about="https://rdf.example.org/1">
    <title>One</title>
    <link>https://rdf.example.org/1</link>
    <dc:date>2024-01-05T12:00:00+01:00</dc:date>
  </item>
</rdf:RDF>"#;

        let feed = parse_feed(rdf.as_bytes()).unwrap();
        assert_eq!(feed.channel.title.as_deref(), Some("RDF Example"));
        assert_eq!(feed.items.len(), 1);
        assert_eq!(
            feed.items[0].pub_date.as_deref(),
            Some("2024-01-05T12:00:00+01:00")
        );
    }

    #[test]
    fn test_media_content_fallback() {
        let rss = r#"<rss xmlns:media="http://search.yahoo.com/mrss/"><channel>
<item>
  <title>t</title>
  <media:group>
    <media:content url="https://img.example.org/group.jpg" medium="image"/>
  </media:group>
</item>
</channel></rss>"#;

        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(
            feed.items[0].media_thumbnail.as_deref(),
            Some("https://img.example.org/group.jpg")
        );
    }

    #[test]
    fn test_channel_without_items() {
        let feed = parse_feed(b"<rss><channel><title>Quiet</title></channel></rss>").unwrap();
        assert!(feed.items.is_empty());
        assert_eq!(feed.channel.title.as_deref(), Some("Quiet"));
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(parse_feed(b""), Err(Error::FeedParse(_))));
        assert!(matches!(parse_feed(b" \n\t "), Err(Error::FeedParse(_))));
    }

    #[test]
    fn test_not_xml_is_error() {
        assert!(matches!(
            parse_feed(b"this is not xml at all"),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_mismatched_tags_is_error() {
        assert!(matches!(
            parse_feed(b"<rss><channel><item><title>oops</channel></rss>"),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_truncated_document_is_error() {
        assert!(matches!(
            parse_feed(b"<rss><channel><item><title>cut</title>"),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_second_root_is_error() {
        assert!(matches!(
            parse_feed(b"<rss></rss><rss></rss>"),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_blank_fields_are_none() {
        let feed = parse_feed(
            b"<rss><channel><item><title>  </title><pubDate></pubDate><link/></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, None);
        assert_eq!(feed.items[0].pub_date, None);
        assert_eq!(feed.items[0].link, None);
    }

    #[test]
    fn test_bare_ampersand_is_error() {
        assert!(matches!(
            parse_feed(b"<rss><channel><item><title>A & B</title></item></channel></rss>"),
            Err(Error::FeedParse(_))
        ));
        assert!(matches!(
            parse_feed(b"<rss><channel><item><title>A&nbsp;B</title></item></channel></rss>"),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_character_references_accepted() {
        let feed = parse_feed(
            b"<rss><channel><item><title>Caf&#233; &#x26; &lt;bar&gt;</title></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.items[0].title.as_deref(), Some("Caf\u{e9} & <bar>"));
    }

    #[test]
    fn test_malformed_attributes_are_errors() {
        assert!(matches!(
            parse_feed(b"<rss><channel><item><enclosure url=x/></item></channel></rss>"),
            Err(Error::FeedParse(_))
        ));
        // Elements the parser does not read are still checked
        assert!(matches!(
            parse_feed(b"<rss><channel><item><guid isPermaLink=false>1</guid></item></channel></rss>"),
            Err(Error::FeedParse(_))
        ));
        assert!(matches!(
            parse_feed(br#"<rss><channel><item><enclosure url="a" url="b"/></item></channel></rss>"#),
            Err(Error::FeedParse(_))
        ));
    }

    #[test]
    fn test_whitespace_around_cdata_is_kept() {
        let feed = parse_feed(
            b"<rss><channel><item><description>\n  Intro <![CDATA[<b>bold</b>]]> tail\n</description></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(
            feed.items[0].description.as_deref(),
            Some("Intro <b>bold</b> tail")
        );
    }
}
