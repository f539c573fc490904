//! Fragment extraction from raw chat text (regex-based).
//!
//! Four detection heuristics run independently over the whole text and their
//! matches are concatenated in heuristic order. The parser never deduplicates:
//! the same block matched by two heuristics yields two entries, and the dedup
//! gate collapses them at write time.

use regex::Regex;

/// One extracted `(filename, code)` pair. Filename is absent for blocks that
/// carry no marker.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFragment {
    pub filename: Option<String>,
    pub code: String,
}

impl ParsedFragment {
    pub fn new(filename: Option<&str>, code: &str) -> Self {
        Self {
            filename: filename.map(|f| f.to_string()),
            code: code.to_string(),
        }
    }
}

/// Extract source code fragments from exported chat text.
///
/// Heuristics, in order:
/// 1. Labeled template: a `# filename: <name>` line, body, then a `# endof` line.
/// 2. The same template preceded by a literal `Copy code` line (the copy-button
///    label of some chat UIs leaks into exported text right above the code).
/// 3. Triple-backtick fences with optional language tag; a `# filename:` marker
///    on the body's first line is captured as the filename and stripped.
/// 4. Every triple-backtick fence, filename always absent. This deliberately
///    re-matches each block heuristic 3 saw.
///
/// Unterminated markers simply produce no match for that heuristic.
pub fn parse(content: &str) -> Vec<ParsedFragment> {
    let mut fragments = Vec::new();

    // Heuristic 1: labeled template
    let template = Regex::new(r"(?s)# filename: (.+?)\n(.*?)\n# endof")
        .expect("Invalid regex pattern");
    for cap in template.captures_iter(content) {
        fragments.push(ParsedFragment::new(
            Some(cap.get(1).unwrap().as_str()),
            cap.get(2).unwrap().as_str(),
        ));
    }

    // Heuristic 2: 'Copy code' prefixed template
    let copy_code = Regex::new(r"(?s)Copy code\n# filename: (.+?)\n(.*?)\n# endof")
        .expect("Invalid regex pattern");
    for cap in copy_code.captures_iter(content) {
        fragments.push(ParsedFragment::new(
            Some(cap.get(1).unwrap().as_str()),
            cap.get(2).unwrap().as_str(),
        ));
    }

    // Heuristic 3: fenced blocks, filename taken from a leading marker line
    let fenced = Regex::new(r"(?s)```(?:\w*\n)?(.*?)```")
        .expect("Invalid regex pattern");
    let filename_marker = Regex::new(r"^# filename: (.+?)\n")
        .expect("Invalid regex pattern");
    for cap in fenced.captures_iter(content) {
        let block = cap.get(1).unwrap().as_str();
        if let Some(marker) = filename_marker.captures(block) {
            let filename = marker.get(1).unwrap().as_str().trim();
            let code = &block[marker.get(0).unwrap().end()..];
            fragments.push(ParsedFragment::new(Some(filename), code.trim()));
        } else {
            fragments.push(ParsedFragment::new(None, block.trim()));
        }
    }

    // Heuristic 4: every fenced block, anonymous
    let plain_fenced = Regex::new(r"(?s)```[\w]*\n(.*?)```")
        .expect("Invalid regex pattern");
    for cap in plain_fenced.captures_iter(content) {
        fragments.push(ParsedFragment::new(None, cap.get(1).unwrap().as_str().trim()));
    }

    fragments
}
