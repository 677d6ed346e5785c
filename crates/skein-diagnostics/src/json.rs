// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Machine-readable diagnostic reports.

use serde::Serialize;
use skein_ast::{LineMap, Span};

use crate::codes::ErrorCodeRegistry;
use crate::{Diagnostic, LabelStyle, Severity};

/// Every diagnostic produced while lowering one file.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub version: u32,
    pub file: String,
    /// No errors. Warnings do not count.
    pub success: bool,
    pub phase: String,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// From the code registry, e.g. "Iteration".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Position>,
    pub labels: Vec<JsonLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<JsonSuggestion>,
}

/// 1-based line and column plus the byte offset.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct JsonLabel {
    pub style: LabelStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start: Position,
    pub end: Position,
    pub source_line: String,
}

#[derive(Debug, Serialize)]
pub struct JsonSuggestion {
    pub span: Span,
    pub replacement: String,
    /// The source line with the replacement applied.
    pub result_line: String,
}

pub fn to_json_report(diagnostics: &[Diagnostic], source: &str, file: &str, phase: &str) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let lines = LineMap::new(source);

    let error_count = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
    let warning_count = diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();

    DiagnosticReport {
        version: 1,
        file: file.to_string(),
        success: error_count == 0,
        phase: phase.to_string(),
        diagnostics: diagnostics.iter().map(|d| convert(d, source, &lines, &registry)).collect(),
        error_count,
        warning_count,
    }
}

pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

fn convert(diag: &Diagnostic, source: &str, lines: &LineMap, registry: &ErrorCodeRegistry) -> JsonDiagnostic {
    let position = |offset: usize| {
        let (line, column) = lines.offset_to_line_col(offset);
        Position { line, column, offset }
    };
    let line_text = |offset: usize| lines.line_text(source, lines.offset_to_line_col(offset).0).unwrap_or("");

    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_deref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let labels = diag
        .labels
        .iter()
        .map(|label| JsonLabel {
            style: label.style,
            message: label.message.clone(),
            start: position(label.span.start),
            end: position(label.span.end),
            source_line: line_text(label.span.start).to_string(),
        })
        .collect();

    let suggestion = diag.help.as_ref().and_then(|h| h.suggestion.as_ref()).map(|s| {
        let line_start = s.span.start - (position(s.span.start).column as usize - 1);
        let text = line_text(s.span.start);
        let from = s.span.start - line_start;
        let to = (s.span.end - line_start).min(text.len());
        let result_line = match (text.get(..from), text.get(to..)) {
            (Some(before), Some(after)) => format!("{}{}{}", before, s.replacement, after),
            _ => text.to_string(),
        };
        JsonSuggestion { span: s.span, replacement: s.replacement.clone(), result_line }
    });

    JsonDiagnostic {
        severity: diag.severity,
        code,
        category,
        message: diag.message.clone(),
        location: diag.primary_span().map(|span| position(span.start)),
        labels,
        notes: diag.notes.clone(),
        help: diag.help.as_ref().map(|h| h.message.clone()),
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToDiagnostic;
    use pretty_assertions::assert_eq;
    use skein_bind::{IterationError, LoweringError};

    const SRC: &str = "method run() {\n  foreach (string s in counts) { break outr; }\n}";

    #[test]
    fn report_counts_and_locations() {
        let at = SRC.find("string").unwrap();
        let brk = SRC.find("break").unwrap();
        let diags = vec![
            IterationError::conversion_missing("i32".into(), "string".into(), Span::new(at, at + 6))
                .to_diagnostic()
                .with_suggestion(Span::new(at, at + 6), "var"),
            IterationError::pattern_not_applicable("Counts".into(), "get_enumerator", Span::new(at, at + 6))
                .to_diagnostic(),
            LoweringError::unknown_label("outr".into(), vec![], Span::new(brk, brk + 11)).to_diagnostic(),
        ];

        let report = to_json_report(&diags, SRC, "run.sk", "lower");
        assert!(!report.success);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.warning_count, 1);

        let first = &report.diagnostics[0];
        assert_eq!(first.category.as_deref(), Some("Iteration"));
        assert_eq!(first.location, Some(Position { line: 2, column: 12, offset: at }));
        assert_eq!(first.labels[0].source_line, "  foreach (string s in counts) { break outr; }");
        let suggestion = first.suggestion.as_ref().unwrap();
        assert_eq!(suggestion.result_line, "  foreach (var s in counts) { break outr; }");
    }

    #[test]
    fn serializes_lowercase_enums() {
        let d = Diagnostic::warning("w").with_primary(Span::new(0, 6), "here");
        let json = to_json_string(&to_json_report(&[d], SRC, "run.sk", "bind"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["diagnostics"][0]["severity"], "warning");
        assert_eq!(value["diagnostics"][0]["labels"][0]["style"], "primary");
        assert_eq!(value["diagnostics"][0]["labels"][0]["end"]["column"], 7);
        assert!(value["diagnostics"][0].get("code").is_none());
    }
}
