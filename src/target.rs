//! The function under test and its optional signature metadata.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TinyTestError};

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

fn top_level_def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(")
            .expect("invalid def regex")
    })
}

/// True if `name` can appear as a single name in a Python import statement.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !PYTHON_KEYWORDS.contains(&name)
}

/// True if `path` is a dotted sequence of identifiers, e.g. `data.modules`.
pub fn is_dotted_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Name of the first top-level function defined in `source`.
pub fn extract_function_name(source: &str) -> Option<String> {
    top_level_def_regex()
        .captures(source)
        .map(|caps| caps[1].to_string())
}

/// Signature metadata for one function, as produced by the metadata extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgMetadata>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgMetadata {
    pub name: String,
    #[serde(default, rename = "type")]
    pub arg_type: Option<String>,
}

impl FunctionMetadata {
    /// One-line hint appended to rendered prompts.
    pub fn hint(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "HINT - Function: {}, Args: {}, Returns: {}",
            self.name,
            args,
            self.returns.as_deref().unwrap_or("None")
        )
    }
}

/// Metadata file for one module (`<metadata_dir>/<module_stem>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    #[serde(default)]
    pub functions: Vec<FunctionMetadata>,
}

impl ModuleMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Entry for `name`, falling back to the first function listed.
    pub fn function(&self, name: &str) -> Option<&FunctionMetadata> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.functions.first())
    }
}

/// The function a test file is synthesized for.
///
/// `module_name` and `function_name` are valid Python identifiers; the
/// source defines `function_name` at top level.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFunction {
    module_name: String,
    function_name: String,
    source_code: String,
    metadata: Option<FunctionMetadata>,
}

impl TargetFunction {
    pub fn new(
        module_name: impl Into<String>,
        function_name: impl Into<String>,
        source_code: impl Into<String>,
    ) -> Result<Self> {
        let module_name = module_name.into();
        let function_name = function_name.into();
        let source_code = source_code.into();

        if !is_identifier(&module_name) {
            return Err(TinyTestError::InvalidTarget(format!(
                "module name `{}` is not a Python identifier",
                module_name
            )));
        }
        if !is_identifier(&function_name) {
            return Err(TinyTestError::InvalidTarget(format!(
                "function name `{}` is not a Python identifier",
                function_name
            )));
        }
        let defines_function = top_level_def_regex()
            .captures_iter(&source_code)
            .any(|caps| caps[1] == *function_name);
        if !defines_function {
            return Err(TinyTestError::InvalidTarget(format!(
                "source of `{}` does not define `{}`",
                module_name, function_name
            )));
        }

        Ok(Self {
            module_name,
            function_name,
            source_code,
            metadata: None,
        })
    }

    /// Target for the first top-level function in `source_code`.
    pub fn from_source(module_name: impl Into<String>, source_code: impl Into<String>) -> Result<Self> {
        let module_name = module_name.into();
        let source_code = source_code.into();
        let function_name = extract_function_name(&source_code).ok_or_else(|| {
            TinyTestError::InvalidTarget(format!("no function definition found in `{}`", module_name))
        })?;
        Self::new(module_name, function_name, source_code)
    }

    pub fn with_metadata(mut self, metadata: Option<FunctionMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn metadata(&self) -> Option<&FunctionMetadata> {
        self.metadata.as_ref()
    }
}
