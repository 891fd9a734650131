//! Rich-text drafts for inline editing.
//!
//! A draft is a list of styled runs plus a block alignment. It reads the
//! markup the editor itself produces (`b`, `i`, `u`, `s`, `span` and `font`
//! styling, `div`/`p` alignment, `br`), applies formatting commands to
//! character ranges and renders back to that same markup. Unknown tags are
//! dropped and their text kept.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*?)/?>").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    const fn as_css(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }

    fn from_css(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            "justify" => Some(Self::Justify),
            _ => None,
        }
    }
}

/// A toolbar action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    Strike,
    Align(Alignment),
    /// CSS font size such as `18px`; empty clears it.
    FontSize(String),
    /// CSS color; empty clears it.
    Color(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RunStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    font_size: Option<String>,
    color: Option<String>,
}

impl RunStyle {
    fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    text: String,
    style: RunStyle,
}

/// Editable rich text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichTextDraft {
    runs: Vec<Run>,
    alignment: Option<Alignment>,
}

impl RichTextDraft {
    /// A draft holding unformatted text.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut draft = Self::default();
        draft.push(text, RunStyle::default());
        draft
    }

    /// Read editor markup.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let mut draft = Self::default();
        let mut stack: Vec<(String, RunStyle)> = Vec::new();
        let mut style = RunStyle::default();
        let mut cursor = 0;

        for token in TOKEN.captures_iter(html) {
            let Some(whole) = token.get(0) else { continue };
            draft.push(&unescape(html.get(cursor..whole.start()).unwrap_or_default()), style.clone());
            cursor = whole.end();

            let closing = !token[1].is_empty();
            let tag = token[2].to_ascii_lowercase();
            if tag == "br" {
                draft.push("\n", style.clone());
                continue;
            }
            if closing {
                if let Some(i) = stack.iter().rposition(|(open, _)| *open == tag) {
                    style = stack.get(i).map(|(_, s)| s.clone()).unwrap_or_default();
                    stack.truncate(i);
                }
                continue;
            }

            stack.push((tag.clone(), style.clone()));
            let attributes = parse_attributes(&token[3]);
            match tag.as_str() {
                "b" | "strong" => style.bold = true,
                "i" | "em" => style.italic = true,
                "u" => style.underline = true,
                "s" | "strike" | "del" => style.strike = true,
                "font" => {
                    if let Some(color) = attribute(&attributes, "color") {
                        style.color = Some(color.to_string());
                    }
                    if let Some(size) = attribute(&attributes, "size") {
                        style.font_size = Some(size.to_string());
                    }
                }
                _ => {}
            }
            if let Some(css) = attribute(&attributes, "style") {
                for (name, value) in parse_css(css) {
                    match name.as_str() {
                        "color" => style.color = Some(value),
                        "font-size" => style.font_size = Some(value),
                        "font-weight" => style.bold = value == "bold" || value.parse::<u16>().is_ok_and(|w| w >= 600),
                        "font-style" => style.italic = value == "italic",
                        "text-decoration" | "text-decoration-line" => {
                            style.underline |= value.contains("underline");
                            style.strike |= value.contains("line-through");
                        }
                        "text-align" => draft.alignment = Alignment::from_css(&value).or(draft.alignment),
                        _ => {}
                    }
                }
            }
        }
        draft.push(&unescape(html.get(cursor..).unwrap_or_default()), style);
        draft
    }

    /// Text without formatting.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Number of characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.text.chars().count()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Replace the whole content with unformatted text, keeping alignment.
    pub fn set_text(&mut self, text: &str) {
        self.runs.clear();
        self.push(text, RunStyle::default());
    }

    /// Apply a command to the characters in `range`. Alignment always
    /// applies to the whole block. Toggles switch off only when every
    /// character in the range already has the style.
    pub fn apply(&mut self, command: &FormatCommand, range: Range<usize>) {
        if let FormatCommand::Align(alignment) = command {
            self.alignment = Some(*alignment);
            return;
        }
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        if start == end {
            return;
        }
        let (first, last) = self.split_range(start, end);
        let selected = first..last;

        let all = |flag: fn(&RunStyle) -> bool| {
            self.runs
                .get(selected.clone())
                .is_some_and(|runs| runs.iter().all(|r| flag(&r.style)))
        };
        let toggle_bold = !all(|s| s.bold);
        let toggle_italic = !all(|s| s.italic);
        let toggle_underline = !all(|s| s.underline);
        let toggle_strike = !all(|s| s.strike);

        for run in self.runs.get_mut(selected).into_iter().flatten() {
            let style = &mut run.style;
            match command {
                FormatCommand::Bold => style.bold = toggle_bold,
                FormatCommand::Italic => style.italic = toggle_italic,
                FormatCommand::Underline => style.underline = toggle_underline,
                FormatCommand::Strike => style.strike = toggle_strike,
                FormatCommand::FontSize(size) => {
                    style.font_size = (!size.trim().is_empty()).then(|| size.trim().to_string());
                }
                FormatCommand::Color(color) => {
                    style.color = (!color.trim().is_empty()).then(|| color.trim().to_string());
                }
                FormatCommand::Align(_) => {}
            }
        }
        self.normalize();
    }

    /// Whether any formatting is in use.
    #[must_use]
    pub fn used_formatting(&self) -> bool {
        self.alignment.is_some() || self.runs.iter().any(|r| !r.style.is_plain())
    }

    /// Render to editor markup.
    #[must_use]
    pub fn to_html(&self) -> String {
        let body: String = self.runs.iter().map(render_run).collect();
        match self.alignment {
            Some(alignment) => format!("<div style=\"text-align: {}\">{body}</div>", alignment.as_css()),
            None => body,
        }
    }

    /// The value a save sends: markup when formatting is in use and changes
    /// the output, plain text otherwise.
    #[must_use]
    pub fn value_to_persist(&self) -> String {
        let plain = self.plain_text();
        let html = self.to_html();
        if self.used_formatting() && html != escape(&plain).replace('\n', "<br>") {
            html
        } else {
            plain
        }
    }

    fn push(&mut self, text: &str, style: RunStyle) {
        if text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.runs.push(Run {
                text: text.to_string(),
                style,
            }),
        }
    }

    /// Split runs so that `start` and `end` (in chars) fall on run
    /// boundaries. Returns the run index range covering them.
    fn split_range(&mut self, start: usize, end: usize) -> (usize, usize) {
        let first = self.split_at(start);
        let last = self.split_at(end);
        (first, last)
    }

    /// Split at a char offset; returns the index of the run starting there.
    fn split_at(&mut self, offset: usize) -> usize {
        let mut seen = 0;
        for i in 0..self.runs.len() {
            let Some(run) = self.runs.get(i) else { break };
            let count = run.text.chars().count();
            if offset == seen {
                return i;
            }
            if offset < seen + count {
                let byte = run
                    .text
                    .char_indices()
                    .nth(offset - seen)
                    .map_or(run.text.len(), |(b, _)| b);
                let tail = Run {
                    text: run.text.get(byte..).unwrap_or_default().to_string(),
                    style: run.style.clone(),
                };
                if let Some(run) = self.runs.get_mut(i) {
                    run.text.truncate(byte);
                }
                self.runs.insert(i + 1, tail);
                return i + 1;
            }
            seen += count;
        }
        self.runs.len()
    }

    fn normalize(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        for run in runs {
            self.push(&run.text, run.style);
        }
    }
}

fn render_run(run: &Run) -> String {
    let mut html = escape(&run.text).replace('\n', "<br>");
    let style = &run.style;
    if style.strike {
        html = format!("<s>{html}</s>");
    }
    if style.underline {
        html = format!("<u>{html}</u>");
    }
    if style.italic {
        html = format!("<i>{html}</i>");
    }
    if style.bold {
        html = format!("<b>{html}</b>");
    }
    let css: Vec<String> = [
        style.color.as_ref().map(|c| format!("color: {c}")),
        style.font_size.as_ref().map(|s| format!("font-size: {s}")),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !css.is_empty() {
        html = format!("<span style=\"{}\">{html}</span>", css.join("; "));
    }
    html
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map_or("", |m| m.as_str());
            (c[1].to_ascii_lowercase(), unescape(value))
        })
        .collect()
}

fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn parse_css(css: &str) -> Vec<(String, String)> {
    css.split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_persists_as_text() {
        let mut draft = RichTextDraft::from_text("Hola mundo");
        assert!(!draft.used_formatting());
        assert_eq!(draft.value_to_persist(), "Hola mundo");

        draft.set_text("2 < 3");
        assert_eq!(draft.value_to_persist(), "2 < 3");
    }

    #[test]
    fn test_bold_range() {
        let mut draft = RichTextDraft::from_text("Hola mundo");
        draft.apply(&FormatCommand::Bold, 5..10);
        assert_eq!(draft.to_html(), "Hola <b>mundo</b>");
        assert_eq!(draft.value_to_persist(), "Hola <b>mundo</b>");
        assert_eq!(draft.plain_text(), "Hola mundo");

        // Toggling off when the whole range is bold.
        draft.apply(&FormatCommand::Bold, 5..10);
        assert!(!draft.used_formatting());
        assert_eq!(draft.to_html(), "Hola mundo");
    }

    #[test]
    fn test_mixed_toggle_sets() {
        let mut draft = RichTextDraft::from_html("<b>Ho</b>la");
        draft.apply(&FormatCommand::Bold, 0..4);
        assert_eq!(draft.to_html(), "<b>Hola</b>");
    }

    #[test]
    fn test_color_size_and_alignment() {
        let mut draft = RichTextDraft::from_text("Promo");
        draft.apply(&FormatCommand::Color("#ff0000".into()), 0..5);
        draft.apply(&FormatCommand::FontSize("18px".into()), 0..5);
        draft.apply(&FormatCommand::Align(Alignment::Center), 0..0);
        assert_eq!(
            draft.to_html(),
            "<div style=\"text-align: center\"><span style=\"color: #ff0000; font-size: 18px\">Promo</span></div>"
        );
    }

    #[test]
    fn test_reads_own_output() {
        let html = "<div style=\"text-align: right\">Pizza <i><b>al</b></i> horno<br><s>barro</s></div>";
        let draft = RichTextDraft::from_html(html);
        assert_eq!(draft.plain_text(), "Pizza al horno\nbarro");
        assert_eq!(RichTextDraft::from_html(&draft.to_html()), draft);
    }

    #[test]
    fn test_unknown_tags_keep_text() {
        let draft = RichTextDraft::from_html("<h2>Menú</h2><script>x</script>");
        assert_eq!(draft.plain_text(), "Menúx");
        assert!(!draft.used_formatting());
    }

    #[test]
    fn test_multibyte_ranges() {
        let mut draft = RichTextDraft::from_text("Ñandú feliz");
        draft.apply(&FormatCommand::Underline, 0..5);
        assert_eq!(draft.to_html(), "<u>Ñandú</u> feliz");
    }
}
