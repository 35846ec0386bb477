//! Decision request rendering.

use super::ArbitrationRequest;
use crate::model::Record;
use std::fmt;

const INSTRUCTIONS: &str = r#"## Your Task
Determine if these records refer to:
1. **SAME_EDITION** - The exact same printing/edition of the work
2. **SAME_WORK** - The same work but a different edition/printing
3. **DIFFERENT** - Different works entirely

Consider:
- Latin titles often have variations (abbreviated vs full)
- Author names vary (Latinized forms, initials, etc.)
- Titles may embed the author name or belong to collected works
- Year differences may indicate reprints

Respond in this exact JSON format:
{
    "verdict": "SAME_EDITION" | "SAME_WORK" | "DIFFERENT",
    "confidence": "high" | "medium" | "low",
    "reasoning": "Brief explanation of your decision"
}"#;

fn field(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "Unknown",
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, heading: &str, record: &Record) -> fmt::Result {
    writeln!(f, "## {heading} (catalog: {})", record.source_catalog)?;
    writeln!(f, "- Identifier: {}", record.id)?;
    writeln!(f, "- Title: {}", field(Some(&record.title)))?;
    writeln!(f, "- Author: {}", field(record.author.as_deref()))?;
    match record.year {
        Some(year) => writeln!(f, "- Year: {year}")?,
        None => writeln!(f, "- Year: Unknown")?,
    }
    writeln!(f, "- Place: {}", field(record.place.as_deref()))?;
    writeln!(f)
}

struct Prompt<'a>(&'a ArbitrationRequest);

impl fmt::Display for Prompt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = self.0;
        let signals = &request.signals;
        writeln!(
            f,
            "You are an expert bibliographer evaluating whether two catalog records refer to the same book.\n"
        )?;
        write_record(f, "Record A", &request.record_a)?;
        write_record(f, "Record B", &request.record_b)?;

        writeln!(f, "## Similarity Scores")?;
        if let Some(semantic) = signals.semantic_score {
            writeln!(f, "- Semantic similarity: {semantic:.3}")?;
        }
        match signals.title_score {
            Some(title) => writeln!(f, "- Fuzzy title match: {title:.0}%")?,
            None => writeln!(f, "- Fuzzy title match: unavailable")?,
        }
        writeln!(f, "- Author name match: {}", yes_no(signals.author_match))?;
        writeln!(
            f,
            "- Year match (±{} years): {}",
            request.year_tolerance,
            yes_no(signals.year_match)
        )?;
        writeln!(f)?;
        f.write_str(INSTRUCTIONS)
    }
}

/// Render the decision request sent to the oracle.
pub fn render_prompt(request: &ArbitrationRequest) -> String {
    Prompt(request).to_string()
}
