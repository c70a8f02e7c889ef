use crate::types::{ConsolidatedSummary, Transcript};

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

pub fn format_timestamp_range(start: f64, end: f64) -> String {
    format!("{} - {}", format_timestamp(start), format_timestamp(end))
}

/// Format transcript segments with timestamps
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|seg| format!("[{}] {}", format_timestamp(seg.start), seg.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn format_summary_readable(summary: &ConsolidatedSummary) -> String {
    let mut output = String::new();

    if !summary.success {
        output.push_str("# Summary unavailable\n\n");
        if let Some(error) = &summary.error {
            output.push_str(&format!("{}\n", error));
        }
        return output;
    }

    output.push_str("# Summary\n\n");
    output.push_str(&format!(
        "**Model:** {} | **Method:** {} | **Transcript:** {} chars{}\n\n",
        summary.metadata.model,
        summary.metadata.method,
        summary.metadata.transcript_length,
        if summary.metadata.consolidated {
            " | consolidated"
        } else {
            ""
        }
    ));

    if !summary.executive_summary.is_empty() {
        output.push_str(&summary.executive_summary);
        output.push_str("\n\n");
    }

    if !summary.target_audience.is_empty() {
        output.push_str(&format!("**Audience:** {}\n\n", summary.target_audience));
    }

    if !summary.key_takeaways.is_empty() {
        output.push_str("## Key takeaways\n\n");
        for takeaway in &summary.key_takeaways {
            output.push_str(&format!("• {}\n", takeaway));
        }
        output.push('\n');
    }

    output.push_str("## Sections\n\n");
    for section in &summary.sections {
        output.push_str(&format!(
            "### [{}] {}\n\n",
            section.timestamp_range, section.title
        ));
        output.push_str(&format!("{}\n\n", section.summary_text));
        for point in &section.key_points {
            output.push_str(&format!("- {}\n", point));
        }
        if !section.key_points.is_empty() {
            output.push('\n');
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Segment, SectionSummary, SummaryMetadata};

    #[test]
    fn timestamps_are_zero_padded() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.4), "01:05");
        assert_eq!(format_timestamp(3725.0), "62:05");
        assert_eq!(format_timestamp_range(30.0, 90.0), "00:30 - 01:30");
    }

    #[test]
    fn transcript_lines_carry_markers() {
        let transcript = Transcript {
            text: "hello world".to_string(),
            segments: vec![
                Segment {
                    start: 0.0,
                    end: 2.0,
                    text: " hello ".to_string(),
                },
                Segment {
                    start: 61.0,
                    end: 63.0,
                    text: "world".to_string(),
                },
            ],
            language: "en".to_string(),
        };

        assert_eq!(
            format_transcript_with_timestamps(&transcript),
            "[00:00] hello\n[01:01] world"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn readable_output_lists_sections() {
        let summary = ConsolidatedSummary {
            executive_summary: "Overview.".to_string(),
            key_takeaways: vec!["Do the thing".to_string()],
            target_audience: "Engineers".to_string(),
            sections: vec![SectionSummary {
                title: "Intro".to_string(),
                timestamp_range: "00:00 - 01:00".to_string(),
                summary_text: "Intro text.".to_string(),
                key_points: vec!["First".to_string()],
                entities: vec![],
            }],
            metadata: SummaryMetadata {
                model: "test-model".to_string(),
                method: "m".to_string(),
                transcript_length: 42,
                consolidated: true,
            },
            success: true,
            ..Default::default()
        };

        let text = format_summary_readable(&summary);
        assert!(text.contains("### [00:00 - 01:00] Intro"));
        assert!(text.contains("• Do the thing"));
        assert!(text.contains("consolidated"));
    }
}
