//! Formula report: the plain-text audit of everything trust would cover

use chrono::{DateTime, Utc};
use serde::Serialize;

const INDENT: &str = "    ";
const NO_FORMULAS: &str = "(No formulas found)";

const GUIDANCE: &str = "This report can inform your decision whether or not to trust running \
     formulas in this file. If any of these appear to be anything except numbers or values or a \
     way to calculate them, you should NOT trust this file. Withholding trust will not cause the \
     file to work or render differently. It will only prevent automatic calculation of formulas \
     to compare or set values.";

const PROVENANCE: &str = "If you did not generate this report, you should create another one. \
     Formulas only ever run through the formula explanation engine, so a file opened without it \
     has nothing to worry about.";

const FORMULA_HEADING: &str = "These are the formulas that have been found in this file:";

/// Word wrap `text` to lines of at most `width` characters
///
/// A single word longer than `width` gets a line of its own.
pub fn wordwrap(text: &str, width: usize) -> Vec<String> {
    let mut words = text.split(' ').filter(|w| !w.is_empty());
    let Some(first) = words.next() else {
        return vec![String::new()];
    };

    let mut lines = vec![format!("{} ", first)];
    for word in words {
        let last = lines.len() - 1;
        if lines[last].chars().count() + word.chars().count() > width {
            lines.push(format!("{} ", word));
        } else {
            lines[last].push_str(word);
            lines[last].push(' ');
        }
    }

    for line in &mut lines {
        line.pop();
    }
    lines
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaReport {
    formulas: Vec<String>,
    formula_hash: String,
    generated_at: DateTime<Utc>,
    line_width: usize,
}

impl FormulaReport {
    pub fn new(
        formulas: Vec<String>,
        formula_hash: String,
        generated_at: DateTime<Utc>,
        line_width: usize,
    ) -> Self {
        Self {
            formulas,
            formula_hash,
            generated_at,
            line_width,
        }
    }

    pub fn formulas(&self) -> &[String] {
        &self.formulas
    }

    pub fn formula_hash(&self) -> &str {
        &self.formula_hash
    }

    fn timestamp(&self) -> String {
        self.generated_at.format("%a, %x %X").to_string()
    }

    /// Suggested name for the report text
    pub fn file_name(&self) -> String {
        format!("Formula Report {}.txt", self.timestamp())
    }

    pub fn title(&self) -> String {
        format!("Value and Formula Report, generated {}", self.timestamp())
    }

    pub fn render(&self) -> String {
        let title = self.title();
        let wrap = |text: &str| wordwrap(text, self.line_width).join("\n");

        let formulas = if self.formulas.is_empty() {
            format!("{}{}", INDENT, NO_FORMULAS)
        } else {
            self.formulas
                .iter()
                .map(|f| format!("{}{}", INDENT, f))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "{title}\n{underline}\n\n{guidance}\n\n{provenance}\n\n{heading}\n\n{formulas}\n\n\
             Debug: Hash value {hash}\n(this information is unique to your configuration)",
            title = title,
            underline = "=".repeat(title.chars().count()),
            guidance = wrap(GUIDANCE),
            provenance = wrap(PROVENANCE),
            heading = wrap(FORMULA_HEADING),
            formulas = formulas,
            hash = self.formula_hash,
        )
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wordwrap() {
        assert_eq!(
            wordwrap("aaa bbb ccc", 7),
            vec!["aaa bbb".to_string(), "ccc".to_string()]
        );
        assert_eq!(wordwrap("aaa  bbb", 100), vec!["aaa bbb".to_string()]);
        assert_eq!(wordwrap("", 10), vec![String::new()]);
        assert_eq!(
            wordwrap("supercalifragilistic a", 5),
            vec!["supercalifragilistic".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_wordwrap_respects_width() {
        for line in wordwrap(GUIDANCE, 40) {
            assert!(line.chars().count() <= 40, "{line}");
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_render_lists_formulas() {
        let report = FormulaReport::new(
            vec!["pi * 2".into(), "x + 1".into()],
            "deadbeef".into(),
            generated_at(),
            100,
        );
        let text = report.render();

        assert!(text.starts_with("Value and Formula Report, generated Fri, 03/01/24 12:30:00\n"));
        assert!(text.contains("\n    pi * 2\n    x + 1\n"));
        assert!(text.ends_with(
            "Debug: Hash value deadbeef\n(this information is unique to your configuration)"
        ));
        assert_eq!(
            report.file_name(),
            "Formula Report Fri, 03/01/24 12:30:00.txt"
        );
    }

    #[test]
    fn test_render_without_formulas() {
        let report = FormulaReport::new(Vec::new(), "00".into(), generated_at(), 100);
        assert!(report.render().contains("\n    (No formulas found)\n"));
    }
}
