//! Candidate test files and the cheap structural checks run on them
//! before a validator is invoked.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::generation::GenerationError;

/// `failing_tests` text used when a diagnostic names no individual test.
pub const NO_FAILING_TESTS_REPORTED: &str =
    "(no individual failing tests were reported; see the pytest log)";

fn test_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+(test_[A-Za-z0-9_]*)[ \t]*\(")
            .expect("invalid test def regex")
    })
}

/// Why a candidate was rejected without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralDefect {
    /// The first line is not `from <package>.<module> import <function>`.
    MissingImport { expected: String },
    /// The candidate declares the target function itself.
    Redefinition { function_name: String },
}

impl StructuralDefect {
    /// Log text standing in for validator output.
    pub fn synthetic_log(&self) -> String {
        match self {
            StructuralDefect::MissingImport { expected } => format!(
                "missing required import: the first line must be `{}`",
                expected
            ),
            StructuralDefect::Redefinition { function_name } => format!(
                "redefines target function `{}`: import it instead of declaring it",
                function_name
            ),
        }
    }
}

impl fmt::Display for StructuralDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralDefect::MissingImport { .. } => write!(f, "missing required import"),
            StructuralDefect::Redefinition { function_name } => {
                write!(f, "redefines `{}`", function_name)
            }
        }
    }
}

/// Test source produced by a generation client.
///
/// Construction guarantees non-empty text with at least one `test_` function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTestFile {
    source: String,
}

impl CandidateTestFile {
    /// Accept raw generation output, rejecting non-conforming text.
    pub fn parse(raw: impl Into<String>) -> Result<Self, GenerationError> {
        let source = raw.into();
        if source.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        if !test_def_regex().is_match(&source) {
            return Err(GenerationError::NoTestFunctions);
        }
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }

    /// Names of all `test_` functions, in file order.
    pub fn test_names(&self) -> Vec<String> {
        test_def_regex()
            .captures_iter(&self.source)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Check the import-line contract and that `function_name` is not redeclared.
    pub fn check_structure(
        &self,
        required_import: &str,
        function_name: &str,
    ) -> Result<(), StructuralDefect> {
        let first_line = self
            .source
            .lines()
            .map(str::trim_end)
            .find(|line| !line.trim().is_empty());
        if first_line != Some(required_import) {
            return Err(StructuralDefect::MissingImport {
                expected: required_import.to_string(),
            });
        }

        let name = regex::escape(function_name);
        let redefinition = Regex::new(&format!(
            r"(?m)^(?:[ \t]*(?:(?:async[ \t]+)?def|class)[ \t]+{name}\b|{name}[ \t]*(?::[^=\n]*)?=(?:[^=]|$))"
        ))
        .map_err(|_| StructuralDefect::Redefinition {
            function_name: function_name.to_string(),
        })?;
        if redefinition.is_match(&self.source) {
            return Err(StructuralDefect::Redefinition {
                function_name: function_name.to_string(),
            });
        }

        Ok(())
    }

    /// Source of the test function `name`, decorators included.
    pub fn test_source(&self, name: &str) -> Option<String> {
        let header = Regex::new(&format!(
            r"^([ \t]*)(?:async[ \t]+)?def[ \t]+{}[ \t]*\(",
            regex::escape(name)
        ))
        .ok()?;

        let lines: Vec<&str> = self.source.lines().collect();
        let (def_idx, indent) = lines.iter().enumerate().find_map(|(i, line)| {
            header.captures(line).map(|caps| (i, caps[1].len()))
        })?;

        let mut start = def_idx;
        while start > 0 {
            let prev = lines[start - 1];
            if indentation(prev) == indent && prev.trim_start().starts_with('@') {
                start -= 1;
            } else {
                break;
            }
        }

        let (colon_line, one_liner) = signature_end(&lines, def_idx)?;
        if one_liner {
            return Some(lines[start..=colon_line].join("\n"));
        }

        let mut end = (colon_line + 1).min(lines.len());
        while end < lines.len() {
            let line = lines[end];
            if line.trim().is_empty() || indentation(line) > indent {
                end += 1;
            } else {
                break;
            }
        }
        while end > def_idx + 1 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }

        Some(lines[start..end].join("\n"))
    }

    /// Sources of the named failing tests, sorted by name, for a repair prompt.
    ///
    /// A name whose body cannot be found is listed as a `# <name>` comment.
    pub fn failing_tests_text(&self, names: &BTreeSet<String>) -> String {
        if names.is_empty() {
            return NO_FAILING_TESTS_REPORTED.to_string();
        }
        names
            .iter()
            .map(|name| self.test_source(name).unwrap_or_else(|| format!("# {}", name)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for CandidateTestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Line holding the `:` that closes the signature starting at `def_idx`, and
/// whether code follows it on that line (a one-line test).
///
/// Brackets, string literals and `#` comments are tracked so that colons in
/// defaults, annotations and comments are skipped.
fn signature_end(lines: &[&str], def_idx: usize) -> Option<(usize, bool)> {
    let mut depth = 0usize;
    let mut opened = false;
    let mut quote: Option<char> = None;

    for (idx, line) in lines.iter().enumerate().skip(def_idx) {
        let mut chars = line.char_indices();
        while let Some((pos, c)) = chars.next() {
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' => break,
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => {
                    depth += 1;
                    opened = true;
                }
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                ':' if opened && depth == 0 => {
                    let rest = &line[pos + 1..];
                    let code = rest.split('#').next().unwrap_or("").trim();
                    return Some((idx, !code.is_empty()));
                }
                _ => {}
            }
        }
        // Single-quoted strings do not continue onto the next line.
        quote = None;
    }
    None
}

/// Strip chat artifacts from small-model output.
///
/// Drops markdown fences and any prose before the first `from`, `import` or
/// `def` line. After the last `def test_` block, the first unindented
/// non-code line ends the file.
pub fn clean_output(text: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if cleaned.is_empty()
            && !(trimmed.starts_with("from ")
                || trimmed.starts_with("import ")
                || trimmed.starts_with("def "))
        {
            continue;
        }
        cleaned.push(line);
    }

    if let Some(last_test) = cleaned
        .iter()
        .rposition(|line| line.trim_start().starts_with("def test_"))
    {
        let mut end = last_test + 1;
        while end < cleaned.len() {
            let line = cleaned[end];
            if line.trim().is_empty() || indentation(line) > 0 || line.starts_with(')') {
                end += 1;
            } else {
                break;
            }
        }
        while end > last_test + 1 && cleaned[end - 1].trim().is_empty() {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    let mut out = cleaned.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMPORT: &str = "from data.modules.mathutils import add";

    fn candidate(source: &str) -> CandidateTestFile {
        CandidateTestFile::parse(source).unwrap()
    }

    const GOOD: &str = "from data.modules.mathutils import add


def test_add_positive():
    assert add(1, 2) == 3


@pytest.mark.parametrize(\"a\", [0, 1])
def test_add_zero(a):
    result = add(a, 0)

    assert result == a


def test_add_negative(
    x=-1,
):
    assert add(x, -1) == -2
";

    #[test]
    fn test_parse_rejects_empty_output() {
        assert_eq!(
            CandidateTestFile::parse("   \n\n"),
            Err(GenerationError::Empty)
        );
    }

    #[test]
    fn test_parse_rejects_output_without_tests() {
        assert_eq!(
            CandidateTestFile::parse("Sure! Here are your tests."),
            Err(GenerationError::NoTestFunctions)
        );
        assert_eq!(
            CandidateTestFile::parse("def check_add():\n    assert True\n"),
            Err(GenerationError::NoTestFunctions)
        );
    }

    #[test]
    fn test_parse_keeps_source_verbatim() {
        let source = "def test_a():\n    assert True\n";
        assert_eq!(candidate(source).into_source(), source);
    }

    #[test]
    fn test_test_names_in_file_order() {
        assert_eq!(
            candidate(GOOD).test_names(),
            vec!["test_add_positive", "test_add_zero", "test_add_negative"]
        );
    }

    #[test]
    fn test_check_structure_accepts_conforming_file() {
        assert_eq!(candidate(GOOD).check_structure(IMPORT, "add"), Ok(()));
    }

    #[test]
    fn test_check_structure_tolerates_leading_blank_lines() {
        let source = format!("\n\n{}", GOOD);
        assert_eq!(candidate(&source).check_structure(IMPORT, "add"), Ok(()));
    }

    #[test]
    fn test_check_structure_rejects_missing_import() {
        let source = "def test_add():\n    assert add(1, 1) == 2\n";
        let defect = candidate(source).check_structure(IMPORT, "add").unwrap_err();
        assert_eq!(
            defect,
            StructuralDefect::MissingImport {
                expected: IMPORT.to_string()
            }
        );
        assert!(defect.synthetic_log().starts_with("missing required import"));
    }

    #[test]
    fn test_check_structure_rejects_import_not_on_first_line() {
        let source = format!("import pytest\n{}", GOOD);
        assert!(matches!(
            candidate(&source).check_structure(IMPORT, "add"),
            Err(StructuralDefect::MissingImport { .. })
        ));
    }

    #[test]
    fn test_check_structure_rejects_wrong_module_path() {
        let source = "from mathutils import add\n\ndef test_add():\n    assert add(1, 1) == 2\n";
        assert!(candidate(source).check_structure(IMPORT, "add").is_err());
    }

    #[test]
    fn test_check_structure_rejects_redefinition() {
        let cases = [
            "def add(a, b):\n    return a + b\n",
            "    def add(self, a, b):\n        return a + b\n",
            "class add:\n    pass\n",
            "add = lambda a, b: a + b\n",
            "add: object = None\n",
        ];
        for extra in cases {
            let source = format!("{}\n{}\ndef test_add():\n    assert add(1, 1) == 2\n", IMPORT, extra);
            assert_eq!(
                candidate(&source).check_structure(IMPORT, "add"),
                Err(StructuralDefect::Redefinition {
                    function_name: "add".to_string()
                }),
                "case: {}",
                extra
            );
        }
    }

    #[test]
    fn test_check_structure_ignores_similar_names_and_calls() {
        let source = format!(
            "{}\n\ndef add_helper(x):\n    return x\n\nadder = 3\n\ndef test_add():\n    total = add(1, 1)\n    assert add(1, 1) == 2\n",
            IMPORT
        );
        assert_eq!(candidate(&source).check_structure(IMPORT, "add"), Ok(()));
    }

    #[test]
    fn test_test_source_extracts_block_with_decorators() {
        let body = candidate(GOOD).test_source("test_add_zero").unwrap();
        assert_eq!(
            body,
            "@pytest.mark.parametrize(\"a\", [0, 1])\ndef test_add_zero(a):\n    result = add(a, 0)\n\n    assert result == a"
        );
    }

    #[test]
    fn test_test_source_handles_multiline_signature() {
        let body = candidate(GOOD).test_source("test_add_negative").unwrap();
        assert!(body.starts_with("def test_add_negative("));
        assert!(body.ends_with("assert add(x, -1) == -2"));
    }

    #[test]
    fn test_test_source_one_line_test_stops_at_its_line() {
        let source = "from data.modules.mathutils import add\n\ndef test_a(): assert add(1, 2) == 4\n\ndef test_b():\n    assert add(0, 0) == 0\n";
        let file = candidate(source);
        assert_eq!(
            file.test_source("test_a").unwrap(),
            "def test_a(): assert add(1, 2) == 4"
        );

        let names: BTreeSet<String> = ["test_a".to_string()].into_iter().collect();
        let text = file.failing_tests_text(&names);
        assert!(!text.contains("test_b"));
    }

    #[test]
    fn test_test_source_header_with_trailing_comment() {
        let source = "from data.modules.mathutils import add\n\ndef test_a():  # zero case\n    assert add(0, 0) == 0\n\ndef test_b():\n    assert add(1, 1) == 2\n";
        assert_eq!(
            candidate(source).test_source("test_a").unwrap(),
            "def test_a():  # zero case\n    assert add(0, 0) == 0"
        );
    }

    #[test]
    fn test_test_source_skips_colons_in_defaults_and_annotations() {
        let source = "from data.modules.m import f\n\ndef test_a(x: dict = {\"k\": \"a:b\"}) -> None:\n    assert f(x)\n\ndef test_b():\n    assert f({})\n";
        assert_eq!(
            candidate(source).test_source("test_a").unwrap(),
            "def test_a(x: dict = {\"k\": \"a:b\"}) -> None:\n    assert f(x)"
        );
    }

    #[test]
    fn test_test_source_inside_class() {
        let source = "from data.modules.mathutils import add\n\nclass TestAdd:\n    def test_one(self):\n        assert add(0, 1) == 1\n\n    def test_two(self):\n        assert add(1, 1) == 2\n";
        let body = candidate(source).test_source("test_one").unwrap();
        assert_eq!(body, "    def test_one(self):\n        assert add(0, 1) == 1");
    }

    #[test]
    fn test_test_source_missing_name() {
        assert!(candidate(GOOD).test_source("test_nope").is_none());
        // prefix of an existing name must not match
        assert!(candidate(GOOD).test_source("test_add").is_none());
    }

    #[test]
    fn test_failing_tests_text_is_sorted_and_marks_unknown_names() {
        let names: BTreeSet<String> = ["test_add_zero", "test_add_positive", "test_ghost"]
            .into_iter()
            .map(String::from)
            .collect();
        let text = candidate(GOOD).failing_tests_text(&names);
        let positive = text.find("def test_add_positive").unwrap();
        let zero = text.find("def test_add_zero").unwrap();
        let ghost = text.find("# test_ghost").unwrap();
        assert!(positive < zero && zero < ghost);
        assert!(!text.contains("test_add_negative"));
    }

    #[test]
    fn test_failing_tests_text_empty_set() {
        assert_eq!(
            candidate(GOOD).failing_tests_text(&BTreeSet::new()),
            NO_FAILING_TESTS_REPORTED
        );
    }

    #[test]
    fn test_clean_output_strips_fences_and_preamble() {
        let raw = "Here are the tests you asked for:\n\n```python\nfrom data.modules.mathutils import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```\n\nThese tests cover the basic case.\n";
        assert_eq!(
            clean_output(raw),
            "from data.modules.mathutils import add\n\ndef test_add():\n    assert add(1, 2) == 3\n"
        );
    }

    #[test]
    fn test_clean_output_keeps_body_after_last_assert() {
        let raw = "import pytest\nfrom data.modules.m import f\n\ndef test_raises():\n    with pytest.raises(ValueError):\n        f(-1)\nThe test above checks errors.";
        let cleaned = clean_output(raw);
        assert!(cleaned.contains("        f(-1)\n"));
        assert!(!cleaned.contains("The test above"));
    }

    #[test]
    fn test_clean_output_without_tests_returns_code_lines() {
        let raw = "Explanation first\nimport os\nprint(os.name)";
        assert_eq!(clean_output(raw), "import os\nprint(os.name)\n");
    }
}
