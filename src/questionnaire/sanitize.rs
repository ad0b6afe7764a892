//! Deterministic text cleanup applied before JSON parsing.
//!
//! Model output routinely arrives wrapped in markdown fences, prefixed with
//! prose, or sprinkled with trailing commas and typographic quotes. Each
//! function here is total: the pipeline's only failure point is the final
//! parse step in `parse.rs`.

/// Drop ``` fence markers (and a `json` language tag on opening fences),
/// keeping the fenced content itself.
pub fn strip_code_fences(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    let mut inside = false;

    while let Some(i) = rest.find("```") {
        out.push_str(&rest[..i]);
        rest = &rest[i + 3..];
        if !inside {
            if let Some(tag) = rest.get(..4) {
                if tag.eq_ignore_ascii_case("json") {
                    rest = &rest[4..];
                }
            }
        }
        inside = !inside;
    }
    out.push_str(rest);
    out
}

/// Remove markdown heading lines (`# ...`), keeping everything else.
pub fn strip_headings(s: &str) -> String {
    s.lines()
        .map(|line| {
            let hashes = line.len() - line.trim_start_matches('#').len();
            let after = &line[hashes..];
            if hashes > 0 && after.starts_with(char::is_whitespace) {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// If the text contains a `[...]` span, slice to it; otherwise unchanged.
pub fn slice_array_span(s: &str) -> String {
    match (s.find('['), s.rfind(']')) {
        (Some(first), Some(last)) if last > first => s[first..=last].to_string(),
        _ => s.to_string(),
    }
}

/// Remove trailing commas before `}` or `]`.
pub fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                // Drop the comma, keep the whitespace and closer.
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Normalize typographic quotes to their plain ASCII forms.
pub fn normalize_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// Full cleanup pipeline.
pub fn sanitize(s: &str) -> String {
    let t = strip_code_fences(s);
    let t = strip_headings(&t);
    let t = slice_array_span(&t);
    let t = strip_trailing_commas(&t);
    let t = normalize_quotes(&t);
    t.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_keep_inner_content() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "\n[1]\n");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "\n[1]\n");
        assert_eq!(strip_code_fences("no fences"), "no fences");
        // Unbalanced fence: marker dropped, content kept.
        assert_eq!(strip_code_fences("```json[1]"), "[1]");
    }

    #[test]
    fn headings_are_removed_whole_line() {
        assert_eq!(strip_headings("# Title\n[1]"), "\n[1]");
        assert_eq!(strip_headings("## Sub heading\nbody"), "\nbody");
        // A leading '#' with no space is not a heading.
        assert_eq!(strip_headings("#tag stays"), "#tag stays");
    }

    #[test]
    fn slices_to_outermost_array() {
        assert_eq!(slice_array_span("Sure! Here: [1, 2] Hope it helps."), "[1, 2]");
        assert_eq!(slice_array_span("no array"), "no array");
        // Closing before opening: unchanged.
        assert_eq!(slice_array_span("] then ["), "] then [");
    }

    #[test]
    fn trailing_commas_dropped() {
        assert_eq!(strip_trailing_commas(r#"[{"a":1,}, ]"#), r#"[{"a":1} ]"#);
        assert_eq!(strip_trailing_commas("[1, 2,\n]"), "[1, 2\n]");
        assert_eq!(strip_trailing_commas("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn smart_quotes_normalized() {
        assert_eq!(normalize_quotes("\u{201C}id\u{201D}: \u{2018}x\u{2019}"), r#""id": 'x'"#);
    }

    #[test]
    fn sanitize_is_idempotent_on_clean_json() {
        let clean = r#"[{"id": 1, "text": "Q?"}]"#;
        assert_eq!(sanitize(clean), clean);
        assert_eq!(sanitize(&sanitize(clean)), clean);
    }

    #[test]
    fn sanitize_unwraps_prose_and_fences() {
        let wrapped = "# Questionnaire\nHere you go:\n```json\n[{\"id\": 1,}]\n```\nEnjoy!";
        assert_eq!(sanitize(wrapped), r#"[{"id": 1}]"#);
    }
}
