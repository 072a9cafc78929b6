//! Markdown-subset renderer for streamed replies.
//!
//! The renderer is stateless: every call re-renders the whole accumulated
//! text, so it can be called on each delta of a growing reply. The output is
//! HTML markup wrapped in `<div class="md-content">`.
//!
//! Rendering runs the stages of [`PIPELINE`] in order. The order is part of
//! the output contract:
//! - escaping must precede every stage that inserts tags;
//! - tables must be built before newlines turn into `<br>`;
//! - bold must be resolved before single-asterisk emphasis;
//! - list items must exist before they are grouped.

pub mod escape;
mod inline;
mod table;

pub use escape::{escape_html, unescape_html};

use regex::Regex;

/// One text transform of the rendering pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Remove `<|...|>` control tokens.
    StripControlTokens,
    /// Escape `&`, `<`, `>`.
    EscapeHtml,
    /// Pipe tables.
    Tables,
    /// `#` to `######` headings.
    Headings,
    /// `▶` section titles.
    SectionTitles,
    /// `**bold**` then `*em*`.
    Emphasis,
    /// `` `code` `` spans.
    InlineCode,
    /// `- ` and `1. ` lists.
    Lists,
    /// Newlines to `<br>`.
    LineBreaks,
    /// Drop `<br>` right after block closing tags.
    TrimBlockBreaks,
}

/// Stage order used by [`MarkdownRenderer::render`].
pub const PIPELINE: [Stage; 10] = [
    Stage::StripControlTokens,
    Stage::EscapeHtml,
    Stage::Tables,
    Stage::Headings,
    Stage::SectionTitles,
    Stage::Emphasis,
    Stage::InlineCode,
    Stage::Lists,
    Stage::LineBreaks,
    Stage::TrimBlockBreaks,
];

/// Glyph that introduces a section title line.
pub const SECTION_MARKER: char = '▶';

/// Compiled patterns for the rendering pipeline.
#[derive(Clone, Debug)]
pub struct MarkdownRenderer {
    control_token: Regex,
    cell_line_break: Regex,
    headings: Vec<(usize, Regex)>,
    section_title: Regex,
    bold: Regex,
    inline_code: Regex,
    unordered_item: Regex,
    ordered_item: Regex,
    unordered_run: Regex,
    ordered_run: Regex,
    block_break: Regex,
}

impl MarkdownRenderer {
    /// Compile the renderer patterns.
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let headings = (1..=6)
            .rev()
            .map(|level: usize| {
                Regex::new(&format!(r"(?m)^#{{{level}}} (.+)$")).map(|re| (level, re))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            control_token: Regex::new(r"<\|[^|]+\|>")?,
            cell_line_break: Regex::new(r"(?i)&lt;br&gt;")?,
            headings,
            section_title: Regex::new(&format!(r"(?m)^(#{{1,6}} )?{SECTION_MARKER} (.+)$"))?,
            bold: Regex::new(r"\*\*(.+?)\*\*")?,
            inline_code: Regex::new(r"`([^`]+)`")?,
            unordered_item: Regex::new(r"(?m)^- (.+)$")?,
            ordered_item: Regex::new(r"(?m)^[0-9]+\. (.+)$")?,
            unordered_run: Regex::new(r#"(?:<li class="md-ul-item">.*</li>\n?)+"#)?,
            ordered_run: Regex::new(r#"(?:<li class="md-ol-item">.*</li>\n?)+"#)?,
            block_break: Regex::new(r"(</h[1-6]>|</table>|</ul>|</ol>|</li>|</div>)<br>")?,
        })
    }

    /// Render accumulated reply text to markup.
    #[must_use]
    pub fn render(&self, text: &str) -> String {
        let body = PIPELINE
            .iter()
            .fold(text.to_string(), |acc, stage| self.apply(*stage, &acc));
        format!("<div class=\"md-content\">{body}</div>")
    }

    /// Run a single stage.
    #[must_use]
    pub fn apply(&self, stage: Stage, text: &str) -> String {
        match stage {
            Stage::StripControlTokens => self.control_token.replace_all(text, "").into_owned(),
            Stage::EscapeHtml => escape_html(text),
            Stage::Tables => table::convert_tables(text, &self.cell_line_break),
            Stage::Headings => self.headings.iter().fold(text.to_string(), |acc, (level, re)| {
                re.replace_all(&acc, format!("<h{level} class=\"md-h{level}\">${{1}}</h{level}>"))
                    .into_owned()
            }),
            Stage::SectionTitles => self
                .section_title
                .replace_all(
                    text,
                    format!("<div class=\"md-section-title\">{SECTION_MARKER} ${{2}}</div>"),
                )
                .into_owned(),
            Stage::Emphasis => {
                let bold = self.bold.replace_all(text, "<strong>${1}</strong>");
                inline::convert_emphasis(&bold)
            }
            Stage::InlineCode => self
                .inline_code
                .replace_all(text, "<code class=\"md-inline-code\">${1}</code>")
                .into_owned(),
            Stage::Lists => {
                let items = self
                    .unordered_item
                    .replace_all(text, "<li class=\"md-ul-item\">${1}</li>");
                let items = self
                    .ordered_item
                    .replace_all(&items, "<li class=\"md-ol-item\">${1}</li>");
                let grouped = self
                    .unordered_run
                    .replace_all(&items, "<ul class=\"md-list\">${0}</ul>");
                self.ordered_run
                    .replace_all(&grouped, "<ol class=\"md-list\">${0}</ol>")
                    .into_owned()
            }
            Stage::LineBreaks => text.replace('\n', "<br>"),
            Stage::TrimBlockBreaks => self.block_break.replace_all(text, "${1}").into_owned(),
        }
    }
}
