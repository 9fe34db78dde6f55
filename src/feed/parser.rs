use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting accepted in a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors produced while decoding an RSS document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Well-formed XML, but there is no `<channel>` element to read.
    #[error("document has no <channel> element")]
    MissingChannel,

    /// SEC-003: Nesting depth exceeds safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// One `<item>` exactly as it appeared in the document.
///
/// Nothing here is validated: an empty `title` or an unparseable `pub_date`
/// is left for the ingestion cycle to deal with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// A decoded RSS channel with its items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub channel_title: String,
    pub channel_link: String,
    pub channel_description: String,
    pub items: Vec<RawFeedItem>,
}

/// Decodes an RSS 2.0 document.
///
/// Only the first `<channel>` is read. Of its direct children, `title`,
/// `link`, `description` and every `item` are kept; of each item, `title`,
/// `link`, `description` and `pubDate`. Element names are matched including
/// their prefix, so `<atom:link>` never overwrites `<link>`. Text and CDATA
/// sections are concatenated and the result trimmed.
///
/// # Errors
///
/// - [`ParseError::Xml`] for malformed XML (unclosed or mismatched tags,
///   unknown entities)
/// - [`ParseError::MissingChannel`] when the document has no `<channel>`
/// - [`ParseError::MaxDepthExceeded`] for pathologically nested input
pub fn parse_rss(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; unknown
    // entity references fail `unescape()` instead.
    // Text is trimmed once per field after the loop, so spaces between text
    // and CDATA sections survive.
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut feed: Option<ParsedFeed> = None;
    let mut item: Option<RawFeedItem> = None;
    let mut channel_depth: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if path.len() >= MAX_XML_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                let name = e.name().as_ref().to_vec();
                if name == b"channel" && feed.is_none() {
                    feed = Some(ParsedFeed::default());
                    channel_depth = Some(path.len());
                } else if name == b"item" && in_channel(&path, channel_depth) {
                    item = Some(RawFeedItem::default());
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"channel" if feed.is_none() => {
                    // Self-closing channel: present but empty
                    feed = Some(ParsedFeed::default());
                }
                b"item" if in_channel(&path, channel_depth) => {
                    if let Some(feed) = feed.as_mut() {
                        feed.items.push(RawFeedItem::default());
                    }
                }
                _ => {}
            },
            Ok(Event::End(_)) => {
                let closed = path.pop();
                if closed.as_deref() == Some(b"item".as_slice()) && in_channel(&path, channel_depth)
                {
                    if let (Some(done), Some(feed)) = (item.take(), feed.as_mut()) {
                        feed.items.push(done);
                    }
                }
                if closed.as_deref() == Some(b"channel".as_slice())
                    && channel_depth == Some(path.len())
                {
                    // Anything after the first channel is ignored
                    channel_depth = None;
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                append_text(&path, channel_depth, &mut feed, &mut item, &text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c);
                append_text(&path, channel_depth, &mut feed, &mut item, &text);
            }
            Ok(Event::Eof) if !path.is_empty() => {
                return Err(ParseError::Xml(format!(
                    "document ended inside <{}>",
                    String::from_utf8_lossy(&path[path.len() - 1])
                )));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let mut feed = feed.ok_or(ParseError::MissingChannel)?;
    trim_in_place(&mut feed.channel_title);
    trim_in_place(&mut feed.channel_link);
    trim_in_place(&mut feed.channel_description);
    for item in &mut feed.items {
        trim_in_place(&mut item.title);
        trim_in_place(&mut item.link);
        trim_in_place(&mut item.description);
        trim_in_place(&mut item.pub_date);
    }
    Ok(feed)
}

/// True when the innermost open element is the captured `<channel>`.
fn in_channel(path: &[Vec<u8>], channel_depth: Option<usize>) -> bool {
    channel_depth.is_some_and(|depth| path.len() == depth + 1)
}

/// Route character data to the channel or item field it belongs to.
fn append_text(
    path: &[Vec<u8>],
    channel_depth: Option<usize>,
    feed: &mut Option<ParsedFeed>,
    item: &mut Option<RawFeedItem>,
    text: &str,
) {
    let Some(depth) = channel_depth else {
        return;
    };

    // <channel><field>
    if path.len() == depth + 2 {
        if let Some(feed) = feed.as_mut() {
            let slot = match path[depth + 1].as_slice() {
                b"title" => &mut feed.channel_title,
                b"link" => &mut feed.channel_link,
                b"description" => &mut feed.channel_description,
                _ => return,
            };
            slot.push_str(text);
        }
        return;
    }

    // <channel><item><field>
    if path.len() == depth + 3 && path[depth + 1].as_slice() == b"item" {
        if let Some(item) = item.as_mut() {
            let slot = match path[depth + 2].as_slice() {
                b"title" => &mut item.title,
                b"link" => &mut item.link,
                b"description" => &mut item.description,
                b"pubDate" => &mut item.pub_date,
                _ => return,
            };
            slot.push_str(text);
        }
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}
