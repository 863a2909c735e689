//! Minimal Markdown formatting for terminal output.
//!
//! The input is usually an answer that is still streaming, so anything
//! unterminated (an open code span, a lone `**`) is shown literally instead
//! of swallowing the rest of the line.

use std::io::{self, Write};

use crossterm::style::Stylize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const RULE_WIDTH: usize = 40;
const TAB_STOP: usize = 8;

/// Visual style of a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Bold,
    Italic,
    Code,
    Heading,
    CodeBlock,
    Quote,
    Marker,
    Rule,
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

impl Span {
    fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One output line, before wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub spans: Vec<Span>,
}

impl Line {
    fn single(text: impl Into<String>, style: Style) -> Self {
        Self {
            spans: vec![Span::new(text, style)],
        }
    }

    /// Terminal columns the line takes up unwrapped.
    pub fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.width()).sum()
    }

    /// Terminal rows this line occupies at the given column count.
    ///
    /// A double-width character that does not fit in the last column moves
    /// to the next row whole.
    pub fn rows(&self, cols: u16) -> usize {
        let cols = usize::from(cols.max(1));
        let mut rows = 1;
        let mut used = 0;
        for c in self.spans.iter().flat_map(|s| s.text.chars()) {
            let w = c.width().unwrap_or(0);
            if used + w > cols && used > 0 {
                rows += 1;
                used = 0;
            }
            used += w;
        }
        rows
    }

    /// Text without styling.
    #[cfg(test)]
    pub fn plain(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Format Markdown source into styled lines.
pub fn format(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for raw in text.split('\n') {
        let raw = expand_tabs(raw.trim_end_matches('\r'));
        let raw = raw.as_str();
        let trimmed = raw.trim_start();
        let indent = &raw[..raw.len() - trimmed.len()];

        if trimmed.starts_with("```") {
            in_code = !in_code;
            lines.push(Line::single(trimmed, Style::Rule));
            continue;
        }
        if in_code {
            lines.push(Line::single(raw, Style::CodeBlock));
            continue;
        }

        if let Some(title) = heading(trimmed) {
            lines.push(Line::single(title, Style::Heading));
        } else if is_rule(trimmed) {
            lines.push(Line::single("─".repeat(RULE_WIDTH), Style::Rule));
        } else if let Some(quoted) = quote(trimmed) {
            let mut spans = vec![Span::new("│ ", Style::Marker)];
            spans.extend(inline(quoted).into_iter().map(|mut span| {
                if span.style == Style::Plain {
                    span.style = Style::Quote;
                }
                span
            }));
            lines.push(Line { spans });
        } else if let Some((marker, item)) = list_item(trimmed) {
            let mut spans = Vec::new();
            if !indent.is_empty() {
                spans.push(Span::new(indent, Style::Plain));
            }
            spans.push(Span::new(marker, Style::Marker));
            spans.extend(inline(item));
            lines.push(Line { spans });
        } else {
            lines.push(Line { spans: inline(raw) });
        }
    }

    lines
}

/// Replace tabs with spaces up to the next tab stop.
fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_STOP - col % TAB_STOP;
            out.push_str(&" ".repeat(pad));
            col += pad;
        } else {
            out.push(c);
            col += c.width().unwrap_or(0);
        }
    }
    out
}

fn heading(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ').map(str::trim)
    }
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|&marker| compact.chars().all(|c| c == marker))
}

fn quote(line: &str) -> Option<&str> {
    if line == ">" {
        return Some("");
    }
    line.strip_prefix("> ")
}

/// Split a list item into the marker to display and the item text.
fn list_item(line: &str) -> Option<(String, &str)> {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(item) = line.strip_prefix(bullet) {
            return Some(("• ".to_string(), item));
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(item) = line[digits..].strip_prefix(". ") {
            return Some((format!("{}. ", &line[..digits]), item));
        }
    }
    None
}

/// If `text` opens with `marker` and closes it later, return the enclosed text
/// and whatever follows the closing marker.
fn delimited<'a>(text: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let after = text.strip_prefix(marker)?;
    if after.starts_with(char::is_whitespace) {
        return None;
    }
    let end = after.find(marker)?;
    if end == 0 {
        return None;
    }
    Some((&after[..end], &after[end + marker.len()..]))
}

/// Split a line into styled spans for inline code, bold and italic.
fn inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        let styled = [("`", Style::Code), ("**", Style::Bold), ("*", Style::Italic)]
            .iter()
            .find_map(|&(marker, style)| delimited(rest, marker).map(|found| (found, style)));

        if let Some(((inner, after), style)) = styled {
            if !plain.is_empty() {
                spans.push(Span::new(std::mem::take(&mut plain), Style::Plain));
            }
            spans.push(Span::new(inner, style));
            rest = after;
            continue;
        }

        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            plain.push(ch);
        }
        rest = chars.as_str();
    }

    if !plain.is_empty() || spans.is_empty() {
        spans.push(Span::new(plain, Style::Plain));
    }
    spans
}

/// Write formatted lines, each terminated by a newline.
pub fn write_lines<W: Write>(out: &mut W, lines: &[Line]) -> io::Result<()> {
    for line in lines {
        for span in &line.spans {
            let text = span.text.as_str();
            match span.style {
                Style::Plain => write!(out, "{}", text)?,
                Style::Bold => write!(out, "{}", text.bold())?,
                Style::Italic => write!(out, "{}", text.italic())?,
                Style::Code | Style::CodeBlock => write!(out, "{}", text.yellow())?,
                Style::Heading => write!(out, "{}", text.bold().cyan())?,
                Style::Quote => write!(out, "{}", text.italic().dim())?,
                Style::Marker => write!(out, "{}", text.cyan())?,
                Style::Rule => write!(out, "{}", text.dark_grey())?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styles(line: &Line) -> Vec<Style> {
        line.spans.iter().map(|s| s.style).collect()
    }

    #[test]
    fn test_heading_and_paragraph() {
        let lines = format("## Install\nRun the installer.");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].plain(), "Install");
        assert_eq!(styles(&lines[0]), vec![Style::Heading]);
        assert_eq!(lines[1].plain(), "Run the installer.");
    }

    #[test]
    fn test_inline_styles() {
        let lines = format("Use **sudo** with `apt` *carefully*");
        assert_eq!(
            lines[0].spans,
            vec![
                Span::new("Use ", Style::Plain),
                Span::new("sudo", Style::Bold),
                Span::new(" with ", Style::Plain),
                Span::new("apt", Style::Code),
                Span::new(" ", Style::Plain),
                Span::new("carefully", Style::Italic),
            ]
        );
    }

    #[test]
    fn test_unclosed_markers_stay_literal() {
        let lines = format("run `ls -l and **maybe");
        assert_eq!(lines[0].plain(), "run `ls -l and **maybe");
        assert_eq!(styles(&lines[0]), vec![Style::Plain]);
    }

    #[test]
    fn test_code_block_is_not_formatted() {
        let lines = format("```bash\necho **not bold**\n```\n- item");
        assert_eq!(styles(&lines[0]), vec![Style::Rule]);
        assert_eq!(lines[1].plain(), "echo **not bold**");
        assert_eq!(styles(&lines[1]), vec![Style::CodeBlock]);
        assert_eq!(lines[3].plain(), "• item");
    }

    #[test]
    fn test_lists_quotes_and_rules() {
        let lines = format("  * nested\n12. twelfth\n> careful\n---");
        assert_eq!(lines[0].plain(), "  • nested");
        assert_eq!(lines[1].plain(), "12. twelfth");
        assert_eq!(lines[2].plain(), "│ careful");
        assert_eq!(styles(&lines[2]), vec![Style::Marker, Style::Quote]);
        assert_eq!(styles(&lines[3]), vec![Style::Rule]);
    }

    #[test]
    fn test_rows_wrap() {
        let line = Line::single("x".repeat(100), Style::Plain);
        assert_eq!(line.rows(40), 3);
        assert_eq!(line.rows(100), 1);
        assert_eq!(Line::default().rows(80), 1);
    }

    #[test]
    fn test_rows_count_wide_characters() {
        let line = Line::single("你".repeat(100), Style::Plain);
        assert_eq!(line.width(), 200);
        assert_eq!(line.rows(80), 3);
        // 39 wide characters fill 78 columns; the 40th does not fit in 79.
        let line = Line::single("你".repeat(40), Style::Plain);
        assert_eq!(line.rows(79), 2);
        assert_eq!(line.rows(80), 1);
    }

    #[test]
    fn test_tabs_expand_to_tab_stops() {
        let lines = format("\tx\nab\tc");
        assert_eq!(lines[0].plain(), "        x");
        assert_eq!(lines[0].width(), 9);
        assert_eq!(lines[1].plain(), "ab      c");
        assert_eq!(lines[1].rows(8), 2);
    }

    #[test]
    fn test_write_lines_plain_text_survives() {
        let mut out = Vec::new();
        write_lines(&mut out, &format("# Title\nbody")).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Title"));
        assert!(text.ends_with("body\n"));
    }
}
