// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal rendering of diagnostics.
//!
//! ```text
//! error[E0911]: `x` is already declared
//!   --> loops.sk:4:18
//!     |
//!   2 |     var x = 0;
//!     |         - first declared here
//!    ...
//!   4 |     foreach (var x in xs)
//!     |                  ^ declared again here
//!     |
//!     = help: rename one of the variables
//! ```

use std::collections::BTreeMap;

use colored::{ColoredString, Colorize};
use skein_ast::{LineMap, Span};

use crate::{Diagnostic, Help, Label, LabelStyle, Severity};

pub struct DiagnosticFormatter<'a> {
    source: &'a str,
    file_name: Option<&'a str>,
    line_map: LineMap,
}

/// An underline on one source line. Columns are 1-based, `end` exclusive.
struct Marker<'d> {
    start: usize,
    end: usize,
    style: LabelStyle,
    message: Option<&'d str>,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, file_name: None, line_map: LineMap::new(source) }
    }

    pub fn with_file_name(mut self, name: &'a str) -> Self {
        self.file_name = Some(name);
        self
    }

    /// Render several diagnostics separated by blank lines.
    pub fn format_all(&self, diagnostics: &[Diagnostic]) -> String {
        diagnostics.iter().map(|d| self.format(d)).collect::<Vec<_>>().join("\n")
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        self.header(&mut out, diagnostic);

        let lines = self.marked_lines(&diagnostic.labels);
        let gutter = lines
            .keys()
            .next_back()
            .map_or(2, |last| last.to_string().len().max(2));

        if let Some(primary) = diagnostic.primary_span() {
            let (line, col) = self.line_map.offset_to_line_col(primary.start);
            out.push_str(&format!(
                "  {} {}:{}:{}\n",
                "-->".blue(),
                self.file_name.unwrap_or("<source>"),
                line,
                col
            ));
        }

        let mut prev: Option<u32> = None;
        for (line, markers) in &lines {
            match prev {
                None => out.push_str(&format!("{}\n", pipe(gutter))),
                Some(p) if *line > p + 1 => {
                    out.push_str(&format!("{} {}\n", " ".repeat(gutter), "...".blue()))
                }
                Some(_) => {}
            }
            let text = self.line_map.line_text(self.source, *line).unwrap_or("");
            out.push_str(&format!(
                "{:>width$} {} {}\n",
                line.to_string().blue().bold(),
                "|".blue(),
                text,
                width = gutter + 1,
            ));
            underline(&mut out, markers, gutter);
            prev = Some(*line);
        }

        self.footer(&mut out, diagnostic, gutter, !lines.is_empty());
        out
    }

    fn header(&self, out: &mut String, diagnostic: &Diagnostic) {
        let severity = match diagnostic.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Note => "note".blue().bold(),
        };
        match &diagnostic.code {
            Some(code) => out.push_str(&format!(
                "{}[{}]: {}\n",
                severity,
                code.0.as_str().red().bold(),
                diagnostic.message.bold()
            )),
            None => out.push_str(&format!("{}: {}\n", severity, diagnostic.message.bold())),
        }
    }

    fn footer(&self, out: &mut String, diagnostic: &Diagnostic, gutter: usize, has_source: bool) {
        if has_source && (!diagnostic.notes.is_empty() || diagnostic.help.is_some()) {
            out.push_str(&format!("{}\n", pipe(gutter)));
        }
        for note in &diagnostic.notes {
            out.push_str(&format!("{} {}: {}\n", equals(gutter), "note".cyan().bold(), note));
        }
        if let Some(help) = &diagnostic.help {
            out.push_str(&format!("{} {}: {}\n", equals(gutter), "help".cyan().bold(), help.message));
            self.suggestion(out, help, gutter);
        }
    }

    /// The primary line with the replacement spliced in.
    fn suggestion(&self, out: &mut String, help: &Help, gutter: usize) {
        let Some(suggestion) = &help.suggestion else {
            return;
        };
        let (line, col) = self.line_map.offset_to_line_col(suggestion.span.start);
        let Some(text) = self.line_map.line_text(self.source, line) else {
            return;
        };

        let start = (col as usize - 1).min(text.len());
        let end = (start + suggestion.span.len()).min(text.len());
        let (Some(before), Some(after)) = (text.get(..start), text.get(end..)) else {
            return;
        };

        out.push_str(&format!(
            "{:>width$} {} {}{}{}\n",
            line.to_string().blue().bold(),
            "|".blue(),
            before,
            suggestion.replacement.green(),
            after,
            width = gutter + 1,
        ));
        out.push_str(&format!(
            "{} {}{}\n",
            pipe(gutter),
            " ".repeat(start),
            "+".repeat(suggestion.replacement.chars().count().max(1)).green(),
        ));
    }

    /// Labels grouped by their start line. Spans running past the end of
    /// their first line are cut at the line end.
    fn marked_lines<'d>(&self, labels: &'d [Label]) -> BTreeMap<u32, Vec<Marker<'d>>> {
        let mut lines: BTreeMap<u32, Vec<Marker<'d>>> = BTreeMap::new();
        for label in labels {
            let (line, start) = self.columns(label.span);
            let width = self.line_map.line_text(self.source, line).map_or(0, str::len);
            let (end_line, end) = self.columns(Span::new(label.span.end, label.span.end));
            let end = if end_line == line { end } else { width + 1 };

            lines.entry(line).or_default().push(Marker {
                start,
                end: end.max(start + 1),
                style: label.style,
                message: label.message.as_deref(),
            });
        }
        lines
    }

    fn columns(&self, span: Span) -> (u32, usize) {
        let (line, col) = self.line_map.offset_to_line_col(span.start);
        (line, col as usize)
    }
}

/// Underline row, then one row per message when more than one marker
/// carries a message.
fn underline(out: &mut String, markers: &[Marker<'_>], gutter: usize) {
    let width = markers.iter().map(|m| m.end).max().unwrap_or(1);
    let mut row = vec![' '; width];

    // Secondary first so primary carets win on overlap.
    let mut ordered: Vec<&Marker<'_>> = markers.iter().collect();
    ordered.sort_by_key(|m| (m.style == LabelStyle::Primary, m.start));
    for marker in &ordered {
        let ch = match marker.style {
            LabelStyle::Primary => '^',
            LabelStyle::Secondary => '-',
        };
        for cell in &mut row[marker.start - 1..marker.end - 1] {
            *cell = ch;
        }
    }

    let row: String = row.into_iter().collect();
    let row = row.trim_end();
    let mut messages: Vec<&Marker<'_>> = markers.iter().filter(|m| m.message.is_some()).collect();

    if messages.len() <= 1 {
        match messages.first().and_then(|m| m.message.map(|msg| (m.style, msg))) {
            Some((style, msg)) => {
                out.push_str(&format!("{} {} {}\n", pipe(gutter), paint_row(row), paint(msg, style)))
            }
            None => out.push_str(&format!("{} {}\n", pipe(gutter), paint_row(row))),
        }
        return;
    }

    out.push_str(&format!("{} {}\n", pipe(gutter), paint_row(row)));
    messages.sort_by_key(|m| std::cmp::Reverse(m.start));
    for marker in messages {
        if let Some(msg) = marker.message {
            out.push_str(&format!(
                "{} {}{} {}\n",
                pipe(gutter),
                " ".repeat(marker.start - 1),
                paint("|", marker.style),
                paint(msg, marker.style),
            ));
        }
    }
}

fn pipe(gutter: usize) -> String {
    format!("{} {}", " ".repeat(gutter + 1), "|".blue())
}

fn equals(gutter: usize) -> String {
    format!("{} {}", " ".repeat(gutter + 1), "=".cyan())
}

fn paint(text: &str, style: LabelStyle) -> ColoredString {
    match style {
        LabelStyle::Primary => text.red().bold(),
        LabelStyle::Secondary => text.blue(),
    }
}

/// Color runs of `^` red and runs of `-` blue.
fn paint_row(row: &str) -> String {
    let mut out = String::new();
    let mut rest = row;
    while let Some(first) = rest.chars().next() {
        let len = rest.find(|c: char| c != first).unwrap_or(rest.len());
        let (run, tail) = rest.split_at(len);
        match first {
            '^' => out.push_str(&run.red().bold().to_string()),
            '-' => out.push_str(&run.blue().to_string()),
            _ => out.push_str(run),
        }
        rest = tail;
    }
    out
}
