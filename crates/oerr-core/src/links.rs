//! Link discovery on a table-of-contents page.
//!
//! The page runs through an HTML tokenizer; no tree is built. Every `<a>`
//! start tag contributes its first `href`, entity-decoded, in document order.
//! Anchor text is ignored and duplicates are kept.

use crate::types::Link;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tracing::{debug, instrument, trace};

/// Collect the `href` of every anchor start tag in `html`.
///
/// Tokenization follows the HTML rules, so there is no failure mode:
/// conditional comments, bogus markup, stray `<` and a tag cut off at end
/// of input are recovered from the way a browser would. Anchors inside
/// `<script>`, `<style>`, `<title>` or `<textarea>` text are not links.
///
/// ```rust
/// use oerr_core::links::parse_links;
///
/// let html = r#"<ul><li><a href="e900.htm#a">ORA-00900</a><li><a href="e1500.htm">ORA-01500</a></ul>"#;
/// assert_eq!(parse_links(html), vec!["e900.htm#a", "e1500.htm"]);
/// ```
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn parse_links(html: &str) -> Vec<Link> {
    let mut input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(LinkSink::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    let sink = tokenizer.sink;
    debug!(
        count = sink.links.len(),
        recovered_errors = sink.parse_errors,
        "Extracted links"
    );
    sink.links
}

#[derive(Default)]
struct LinkSink {
    links: Vec<Link>,
    parse_errors: usize,
}

impl LinkSink {
    fn start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        match &*tag.name {
            "a" => {
                if let Some(href) = tag.attrs.iter().find(|a| &*a.name.local == "href") {
                    self.links.push(href.value.to_string());
                }
                TokenSinkResult::Continue
            },
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            },
            "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
            "plaintext" => TokenSinkResult::Plaintext,
            _ => TokenSinkResult::Continue,
        }
    }
}

impl TokenSink for LinkSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) if tag.kind == TagKind::StartTag => self.start_tag(&tag),
            Token::ParseError(reason) => {
                self.parse_errors += 1;
                trace!(line = line_number, %reason, "Recovered from markup error");
                TokenSinkResult::Continue
            },
            _ => TokenSinkResult::Continue,
        }
    }
}
