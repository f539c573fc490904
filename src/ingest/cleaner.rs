/// Strip parser artifacts from an extracted code body.
///
/// Removes every line starting with `# filename:` or `# endof` (nested
/// templates can leave markers inside a captured body), then drops a first or
/// last line that is exactly a bare triple-backtick fence. The caller
/// guarantees the input still holds at least one line after marker removal.
pub fn clean(code: &str) -> String {
    let mut lines: Vec<&str> = code
        .split('\n')
        .filter(|line| !(line.starts_with("# filename:") || line.starts_with("# endof")))
        .collect();

    if lines.first().map(|l| l.trim()) == Some("```") {
        lines.remove(0);
    }
    if lines.last().map(|l| l.trim()) == Some("```") {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_marker_lines() {
        let code = "# filename: nested.py\nx = 1\ny = 2\n# endof";
        assert_eq!(clean(code), "x = 1\ny = 2");
    }

    #[test]
    fn test_clean_removes_marker_lines_anywhere() {
        let code = "a = 1\n# filename: inner.py\nb = 2\n# endof\nc = 3";
        assert_eq!(clean(code), "a = 1\nb = 2\nc = 3");
    }

    #[test]
    fn test_clean_strips_boundary_fences() {
        let code = "```\nprint(1)\n```";
        assert_eq!(clean(code), "print(1)");
        // Fence lines with surrounding whitespace still count as fences
        let code = "  ```  \nprint(2)\n ``` ";
        assert_eq!(clean(code), "print(2)");
    }

    #[test]
    fn test_clean_keeps_interior_fences() {
        let code = "before\n```\nafter";
        assert_eq!(clean(code), "before\n```\nafter");
    }

    #[test]
    fn test_clean_plain_code_unchanged() {
        let code = "def f():\n    return 42";
        assert_eq!(clean(code), code);
    }

    #[test]
    fn test_clean_parsed_fragment_round_trip() {
        // Anything the parser extracts must come out free of markers and
        // boundary fences.
        let content = "```python\n# filename: roundtrip.py\nvalue = [1, 2]\n```";
        for fragment in crate::ingest::parser::parse(content) {
            let cleaned = clean(&fragment.code);
            for line in cleaned.lines() {
                assert!(!line.starts_with("# filename:"));
                assert!(!line.starts_with("# endof"));
            }
            assert_ne!(cleaned.lines().next().map(str::trim), Some("```"));
            assert_ne!(cleaned.lines().last().map(str::trim), Some("```"));
            assert_eq!(cleaned, "value = [1, 2]");
        }
    }
}
