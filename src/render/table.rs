//! Pipe table detection.

use regex::Regex;

/// Whether a trimmed table line is a `|---|:--:|` style separator.
fn is_separator(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '|' | '-' | ':') || c.is_whitespace())
}

/// Split a table line into trimmed cells, dropping the fragments outside the outer pipes.
fn split_cells(line: &str) -> Vec<&str> {
    let mut cells: Vec<&str> = line.split('|').map(str::trim).collect();
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

fn push_row(html: &mut String, line: &str, tag: &str, line_break: &Regex) {
    html.push_str("<tr>");
    for cell in split_cells(line) {
        let content = line_break.replace_all(cell, "<br>");
        html.push_str(&format!("<{tag}>{content}</{tag}>"));
    }
    html.push_str("</tr>");
}

fn table_html(rows: &[&str], line_break: &Regex) -> String {
    let mut html = String::from("<table class=\"md-table\"><thead>");
    if let Some((header, body)) = rows.split_first() {
        push_row(&mut html, header, "th", line_break);
        html.push_str("</thead><tbody>");
        for row in body {
            push_row(&mut html, row, "td", line_break);
        }
    }
    html.push_str("</tbody></table>");
    html
}

/// Replace every run of pipe-delimited lines with a single-line table.
///
/// All lines come out trimmed. Separator lines are dropped wherever they
/// appear. `line_break` matches the escaped `<br>` form to restore in cells.
pub(crate) fn convert_tables(text: &str, line_break: &Regex) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut rows: Vec<&str> = Vec::new();

    for raw in text.split('\n') {
        let line = raw.trim();
        if line.starts_with('|') && line.ends_with('|') {
            if !is_separator(line) {
                rows.push(line);
            }
            continue;
        }
        if !rows.is_empty() {
            out.push(table_html(&rows, line_break));
            rows.clear();
        }
        out.push(line.to_string());
    }
    if !rows.is_empty() {
        out.push(table_html(&rows, line_break));
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn br() -> Regex {
        Regex::new("(?i)&lt;br&gt;").unwrap()
    }

    #[test]
    fn test_separator_detection() {
        assert!(is_separator("|---|---|"));
        assert!(is_separator("| :-- | --: |"));
        assert!(!is_separator("|a|b|"));
    }

    #[test]
    fn test_split_cells_keeps_inner_empty_cell() {
        assert_eq!(split_cells("| a || b |"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_simple_table() {
        let html = convert_tables("|A|B|\n|---|---|\n|1|2|", &br());
        assert_eq!(
            html,
            "<table class=\"md-table\"><thead><tr><th>A</th><th>B</th></tr></thead>\
             <tbody><tr><td>1</td><td>2</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_table_between_paragraphs() {
        let html = convert_tables("  intro\n| x |\n| y &LT;BR&GT; z |\noutro", &br());
        let lines: Vec<&str> = html.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "intro");
        assert!(lines[1].contains("<th>x</th>"));
        assert!(lines[1].contains("<td>y <br> z</td>"));
        assert_eq!(lines[2], "outro");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(convert_tables("no pipes here", &br()), "no pipes here");
        assert_eq!(convert_tables("", &br()), "");
    }
}
