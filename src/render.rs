//! Render pipeline
//!
//! Turns resolved hits into one self-contained markup string. Container HTML is
//! sanitized and its media references rewritten to `wikit-media://` locators
//! the shell fetches through the query service; text source bodies are escaped
//! and laid out from their `::` markers. Interactive parts (tabs, audio
//! buttons, cross-references) are driven by a single engine-owned script.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::format::mdd::mime_type;
use crate::types::{Hit, LookupResult, MatchKind, MediaKind, MediaRef, Payload, RenderedDefinition};
use crate::utils::{escape_html, unescape_entities};

/// Scheme of media locators emitted into markup
pub const MEDIA_SCHEME: &str = "wikit-media://";

/// Elements removed together with their content
const BLOCK_ELEMENTS: &[&str] = &["script", "style", "iframe", "object", "embed", "frameset", "frame"];

/// Elements never emitted, wherever their tags turn up
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "frameset", "frame", "base", "meta", "link", "noscript",
    "template", "xmp", "plaintext", "svg", "math",
];

/// Event handling for tabs, audio buttons and cross-references. Audio and
/// cross-reference clicks are re-dispatched as `wikit:audio` and `wikit:entry`
/// events for the shell to handle.
pub const INTERACTION_SCRIPT: &str = r#"(function () {
  if (window.__wikitEngine) return;
  window.__wikitEngine = true;
  document.addEventListener('click', function (ev) {
    var el = ev.target.closest('[data-wikit-tab],[data-wikit-audio],[data-wikit-entry]');
    if (!el) return;
    ev.preventDefault();
    if (el.hasAttribute('data-wikit-tab')) {
      var box = el.closest('[data-wikit-tabs]');
      var index = el.getAttribute('data-wikit-tab');
      box.querySelectorAll(':scope > .wikit-tablist > [data-wikit-tab]').forEach(function (tab) {
        tab.setAttribute('aria-selected', String(tab === el));
      });
      box.querySelectorAll(':scope > [data-wikit-panel]').forEach(function (panel) {
        panel.hidden = panel.getAttribute('data-wikit-panel') !== index;
      });
    } else if (el.hasAttribute('data-wikit-audio')) {
      el.dispatchEvent(new CustomEvent('wikit:audio', {
        bubbles: true,
        detail: { locator: el.getAttribute('data-wikit-audio') }
      }));
    } else {
      el.dispatchEvent(new CustomEvent('wikit:entry', {
        bubbles: true,
        detail: { headword: el.getAttribute('data-wikit-entry') }
      }));
    }
  });
})();"#;

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives: Vec<String> = BLOCK_ELEMENTS
            .iter()
            .map(|tag| format!(r"<{tag}\b[^>]*>.*?</{tag}\s*>"))
            .collect();
        Regex::new(&format!("(?is){}", alternatives.join("|"))).expect("invalid block element pattern")
    })
}

/// Comments and declarations, closing tags (1), opening tags (2, 3)
fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|</([a-zA-Z][a-zA-Z0-9:-]*)[^>]*>|<([a-zA-Z][a-zA-Z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#,
        )
        .expect("invalid tag pattern")
    })
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'=<>/]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
            .expect("invalid attribute pattern")
    })
}

/// Per-dictionary rendering context
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub dictid: &'a str,
}

impl RenderContext<'_> {
    /// Media locator for `key` in this dictionary
    pub fn media_locator(&self, key: &str) -> String {
        format!("{}{}/{}", MEDIA_SCHEME, self.dictid, key)
    }
}

/// Markup of a single hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    pub html: String,
    pub media: Vec<MediaRef>,
    /// Markup relies on the interaction script
    pub interactive: bool,
}

/// Media references and interactivity gathered while rendering
#[derive(Default)]
struct Collector {
    media: Vec<MediaRef>,
    interactive: bool,
}

impl Collector {
    /// Record a media reference and return its locator
    fn media(&mut self, ctx: &RenderContext<'_>, kind: MediaKind, raw_key: &str) -> String {
        let key = media_key(raw_key);
        let locator = ctx.media_locator(&key);
        if !self.media.iter().any(|m| m.locator == locator) {
            self.media.push(MediaRef {
                kind,
                key,
                locator: locator.clone(),
            });
        }
        locator
    }
}

/// Key in URL form: forward slashes, no leading `./` or `/`
fn media_key(raw: &str) -> String {
    let key = raw.trim().replace('\\', "/");
    let mut key = key.as_str();
    loop {
        if let Some(rest) = key.strip_prefix("./") {
            key = rest;
        } else if let Some(rest) = key.strip_prefix('/') {
            key = rest;
        } else {
            return key.to_string();
        }
    }
}

/// Case-insensitive scheme prefix strip
fn strip_scheme<'v>(value: &'v str, scheme: &str) -> Option<&'v str> {
    let head = value.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme).then(|| &value[scheme.len()..])
}

/// URL that would run code when followed or loaded
fn is_dangerous_url(value: &str) -> bool {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    cleaned.starts_with("javascript:") || cleaned.starts_with("vbscript:") || cleaned.starts_with("data:text/html")
}

/// No scheme and not protocol-relative
fn is_relative_url(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with("//") || value.starts_with('#') {
        return false;
    }
    match value.find(':') {
        Some(colon) => value[..colon].contains(['/', '?', '#']),
        None => true,
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
}

fn is_stripped(tag: &str) -> bool {
    STRIPPED_TAGS.contains(&tag)
}

fn is_safe_attr_name(name: &str) -> bool {
    !name.starts_with("on") && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

fn rewrite_href(out: &mut String, decoded: &str, ctx: &RenderContext<'_>, collector: &mut Collector) {
    if is_dangerous_url(decoded) {
        push_attr(out, "href", "#");
    } else if let Some(key) = strip_scheme(decoded, "sound://") {
        let locator = collector.media(ctx, MediaKind::Audio, key);
        collector.interactive = true;
        push_attr(out, "href", "#");
        push_attr(out, "role", "button");
        push_attr(out, "data-wikit-audio", &locator);
    } else if let Some(target) = strip_scheme(decoded, "entry://").or_else(|| strip_scheme(decoded, "bword://")) {
        if target.starts_with('#') {
            push_attr(out, "href", target);
        } else {
            collector.interactive = true;
            push_attr(out, "href", "#");
            push_attr(out, "data-wikit-entry", target.trim());
        }
    } else {
        push_attr(out, "href", decoded);
    }
}

fn rewrite_src(out: &mut String, tag: &str, decoded: &str, ctx: &RenderContext<'_>, collector: &mut Collector) {
    if is_dangerous_url(decoded) || strip_scheme(decoded, "file:").is_some() {
        return;
    }
    if let Some(key) = strip_scheme(decoded, "sound://") {
        let locator = collector.media(ctx, MediaKind::Audio, key);
        push_attr(out, "src", &locator);
    } else if is_relative_url(decoded) {
        let kind = if tag != "img" && mime_type(decoded).starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Image
        };
        let locator = collector.media(ctx, kind, decoded);
        push_attr(out, "src", &locator);
    } else {
        push_attr(out, "src", decoded);
    }
}

/// Opening tag with its attributes filtered and re-escaped
fn rewrite_tag(tag: &str, raw_attrs: &str, ctx: &RenderContext<'_>, collector: &mut Collector) -> String {
    let mut out = format!("<{}", tag);

    for attr in attr_regex().captures_iter(raw_attrs) {
        let name = attr[1].to_ascii_lowercase();
        if !is_safe_attr_name(&name) {
            continue;
        }
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| unescape_entities(m.as_str()));
        match (name.as_str(), value) {
            ("href", Some(value)) => rewrite_href(&mut out, &value, ctx, collector),
            ("src", Some(value)) => rewrite_src(&mut out, tag, &value, ctx, collector),
            ("style", Some(value)) if is_dangerous_style(&value) => {}
            (_, Some(value)) if is_dangerous_url(&value) => {}
            (_, Some(value)) => push_attr(&mut out, &name, &value),
            (_, None) => {
                let _ = write!(out, " {}", name);
            }
        }
    }

    if raw_attrs.trim_end().ends_with('/') {
        out.push_str(" /");
    }
    out.push('>');
    out
}

/// Inline style able to load or run script
fn is_dangerous_style(value: &str) -> bool {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && *c != '\\')
        .collect::<String>()
        .to_ascii_lowercase();
    ["expression(", "javascript:", "vbscript:", "-moz-binding", "behavior:"]
        .iter()
        .any(|needle| cleaned.contains(needle))
}

/// Sanitize container HTML and rewrite its media and entry links.
///
/// Every `<` left in the output opens a tag this function wrote; anything the
/// tag pattern does not consume is escaped as text.
fn sanitize_html(html: &str, ctx: &RenderContext<'_>, collector: &mut Collector) -> String {
    let html = block_regex().replace_all(html, "");
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in markup_regex().captures_iter(&html) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&html[last..whole.start()].replace('<', "&lt;"));
        last = whole.end();

        if let Some(name) = caps.get(1) {
            let tag = name.as_str().to_ascii_lowercase();
            if !is_stripped(&tag) {
                let _ = write!(out, "</{}>", tag);
            }
        } else if let Some(name) = caps.get(2) {
            let tag = name.as_str().to_ascii_lowercase();
            if !is_stripped(&tag) {
                let attrs = caps.get(3).map_or("", |m| m.as_str());
                out.push_str(&rewrite_tag(&tag, attrs, ctx, collector));
            }
        }
    }
    out.push_str(&html[last..].replace('<', "&lt;"));
    out
}

/// Engine-owned tabs. Labels and panels are already markup.
fn tabs(panels: &[(String, String)]) -> String {
    let mut html = String::from("<div class=\"wikit-tabs\" data-wikit-tabs><div class=\"wikit-tablist\" role=\"tablist\">");
    for (i, (label, _)) in panels.iter().enumerate() {
        let _ = write!(
            html,
            "<button type=\"button\" role=\"tab\" class=\"wikit-tab\" data-wikit-tab=\"{}\" aria-selected=\"{}\">{}</button>",
            i,
            i == 0,
            label
        );
    }
    html.push_str("</div>");
    for (i, (_, panel)) in panels.iter().enumerate() {
        let hidden = if i == 0 { "" } else { " hidden" };
        let _ = write!(
            html,
            "<section class=\"wikit-tabpanel\" role=\"tabpanel\" data-wikit-panel=\"{}\"{}>{}</section>",
            i, hidden, panel
        );
    }
    html.push_str("</div>");
    html
}

fn audio_button(locator: &str) -> String {
    format!(
        "<button type=\"button\" class=\"wikit-audio\" data-wikit-audio=\"{}\" aria-label=\"Play audio\">&#9654;</button>",
        escape_html(locator)
    )
}

fn entry_link(headword: &str) -> String {
    let headword = escape_html(headword);
    format!("<a href=\"#\" class=\"wikit-xref\" data-wikit-entry=\"{}\">{}</a>", headword, headword)
}

/// Body of a text source record split by marker
#[derive(Default)]
struct TextBody {
    paragraphs: Vec<Vec<String>>,
    senses: Vec<String>,
    examples: Vec<String>,
    see_also: Vec<String>,
    audio: Vec<String>,
}

impl TextBody {
    fn parse(body: &str) -> Self {
        let mut parsed = TextBody::default();
        let mut paragraph: Vec<String> = Vec::new();
        for line in body.lines().map(str::trim) {
            let marker = line
                .strip_prefix("::")
                .and_then(|rest| rest.split_once(char::is_whitespace))
                .map(|(name, value)| (name, value.trim()));
            match marker {
                Some(("sense", value)) => parsed.senses.push(value.to_string()),
                Some(("example", value)) => parsed.examples.push(value.to_string()),
                Some(("see", value)) => parsed.see_also.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                ),
                Some(("audio", value)) => parsed.audio.push(value.to_string()),
                _ if line.is_empty() => {
                    if !paragraph.is_empty() {
                        parsed.paragraphs.push(std::mem::take(&mut paragraph));
                    }
                }
                _ => paragraph.push(line.to_string()),
            }
        }
        if !paragraph.is_empty() {
            parsed.paragraphs.push(paragraph);
        }
        parsed
    }
}

fn render_text(headword: &str, body: &str, ctx: &RenderContext<'_>, collector: &mut Collector) -> String {
    let body = TextBody::parse(body);

    let mut definition = String::new();
    for paragraph in &body.paragraphs {
        let lines: Vec<String> = paragraph.iter().map(|l| escape_html(l)).collect();
        let _ = write!(definition, "<p>{}</p>", lines.join("<br>"));
    }
    if !body.senses.is_empty() {
        definition.push_str("<ol class=\"wikit-senses\">");
        for sense in &body.senses {
            let _ = write!(definition, "<li>{}</li>", escape_html(sense));
        }
        definition.push_str("</ol>");
    }

    let mut examples = String::new();
    if !body.examples.is_empty() {
        let _ = write!(
            examples,
            "<details class=\"wikit-examples\"><summary>Examples ({})</summary><ul>",
            body.examples.len()
        );
        for example in &body.examples {
            let _ = write!(examples, "<li>{}</li>", escape_html(example));
        }
        examples.push_str("</ul></details>");
    }

    let mut see_also = String::new();
    if !body.see_also.is_empty() {
        collector.interactive = true;
        see_also.push_str("<ul class=\"wikit-see-also\">");
        for target in &body.see_also {
            let _ = write!(see_also, "<li>{}</li>", entry_link(target));
        }
        see_also.push_str("</ul>");
    }

    let mut header = escape_html(headword);
    for key in &body.audio {
        collector.interactive = true;
        let locator = collector.media(ctx, MediaKind::Audio, key);
        header.push_str(&audio_button(&locator));
    }

    let sections: Vec<(String, String)> = [("Definition", definition), ("Examples", examples), ("See also", see_also)]
        .into_iter()
        .filter(|(_, html)| !html.is_empty())
        .map(|(label, html)| (label.to_string(), html))
        .collect();
    let content = if sections.len() > 1 {
        collector.interactive = true;
        tabs(&sections)
    } else {
        sections.into_iter().map(|(_, html)| html).collect()
    };

    format!(
        "<article class=\"wikit-entry\" data-wikit-headword=\"{}\"><header class=\"wikit-headword\">{}</header><div class=\"wikit-body\">{}</div></article>",
        escape_html(headword),
        header,
        content
    )
}

/// Render one hit
pub fn render_entry(hit: &Hit, ctx: &RenderContext<'_>) -> RenderedEntry {
    let mut collector = Collector::default();
    let headword = escape_html(&hit.headword);

    let html = if let Some(target) = hit.payload.redirect_target() {
        // Redirect left unresolved by the resolver
        collector.interactive = true;
        format!(
            "<article class=\"wikit-entry\" data-wikit-headword=\"{}\"><header class=\"wikit-headword\">{}</header><p class=\"wikit-redirect\">See {}</p></article>",
            headword,
            headword,
            entry_link(target)
        )
    } else {
        match &hit.payload {
            Payload::Html(html) => format!(
                "<article class=\"wikit-entry\" data-wikit-headword=\"{}\"><div class=\"wikit-body\">{}</div></article>",
                headword,
                sanitize_html(html, ctx, &mut collector)
            ),
            Payload::Text(body) => render_text(&hit.headword, body, ctx, &mut collector),
            Payload::Undecodable(_) => format!(
                "<article class=\"wikit-entry wikit-fallback\" data-wikit-headword=\"{}\"><header class=\"wikit-headword\">{}</header><p class=\"wikit-notice\">This entry could not be displayed.</p></article>",
                headword, headword
            ),
        }
    };

    RenderedEntry {
        html,
        media: collector.media,
        interactive: collector.interactive,
    }
}

/// Render a lookup result into the markup returned across the boundary
pub fn render(result: &LookupResult, ctx: &RenderContext<'_>) -> RenderedDefinition {
    let entries: Vec<RenderedEntry> = result.hits.iter().map(|hit| render_entry(hit, ctx)).collect();
    let mut interactive = entries.iter().any(|e| e.interactive);

    let mut media: Vec<MediaRef> = Vec::new();
    for entry in &entries {
        for item in &entry.media {
            if !media.contains(item) {
                media.push(item.clone());
            }
        }
    }

    let body = match (result.match_kind, entries.len()) {
        (MatchKind::None, _) | (_, 0) => format!(
            "<p class=\"wikit-empty\">No entry found for \u{201c}{}\u{201d}.</p>",
            escape_html(&result.query)
        ),
        (_, 1) => entries[0].html.clone(),
        (MatchKind::Exact, _) => {
            interactive = true;
            let panels: Vec<(String, String)> = result
                .hits
                .iter()
                .zip(&entries)
                .enumerate()
                .map(|(i, (hit, entry))| (format!("{} {}", escape_html(&hit.headword), i + 1), entry.html.clone()))
                .collect();
            tabs(&panels)
        }
        (MatchKind::Prefix, _) => {
            let mut list = String::from("<div class=\"wikit-candidates\">");
            for (hit, entry) in result.hits.iter().zip(&entries) {
                let _ = write!(
                    list,
                    "<details class=\"wikit-candidate\"><summary>{}</summary>{}</details>",
                    escape_html(&hit.headword),
                    entry.html
                );
            }
            list.push_str("</div>");
            list
        }
    };

    let mut html = format!(
        "<div class=\"wikit-result\" data-wikit-dict=\"{}\" data-wikit-match=\"{}\">{}</div>",
        escape_html(ctx.dictid),
        result.match_kind.as_str(),
        body
    );
    if interactive {
        let _ = write!(html, "<script data-wikit-engine>{}</script>", INTERACTION_SCRIPT);
    }

    RenderedDefinition {
        match_kind: result.match_kind,
        html,
        media,
    }
}
