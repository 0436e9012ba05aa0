//! Template registry for the four generation strategies.
//!
//! Each [`Strategy`] owns one template and a statically known set of
//! [`Binding`]s. Rendering is verbatim textual substitution: inserted values
//! are never re-scanned, and nothing is escaped.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TinyTestError};
use crate::prompts::{
    AUTO_REPAIR_TEMPLATE, FEW_SHOT_TEMPLATE, STRUCTURED_TEMPLATE, ZERO_SHOT_TEMPLATE,
};
use crate::target::is_dotted_path;

/// Import prefix used when none is configured.
pub const DEFAULT_PACKAGE: &str = "data.modules";

/// Registry-supplied placeholder, not a binding.
const PACKAGE_PLACEHOLDER: &str = "package";

/// Substituted for an optional binding the caller did not supply.
const NOT_PROVIDED: &str = "(not provided)";

// ============================================================================
// Strategy
// ============================================================================

/// Prompt-construction method. Selects which template is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ZeroShot,
    FewShot,
    Structured,
    AutoRepair,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::ZeroShot,
        Strategy::FewShot,
        Strategy::Structured,
        Strategy::AutoRepair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ZeroShot => "zero_shot",
            Strategy::FewShot => "few_shot",
            Strategy::Structured => "structured",
            Strategy::AutoRepair => "auto_repair",
        }
    }

    /// Whether this strategy may be used for the first generation of a loop.
    pub fn is_initial(&self) -> bool {
        !matches!(self, Strategy::AutoRepair)
    }

    /// Bindings that must be present for [`TemplateRegistry::render`] to succeed.
    pub fn required_bindings(&self) -> &'static [Binding] {
        match self {
            Strategy::ZeroShot | Strategy::FewShot | Strategy::Structured => {
                &[Binding::ModuleName, Binding::FunctionName, Binding::Code]
            }
            Strategy::AutoRepair => &[
                Binding::ModuleName,
                Binding::FunctionName,
                Binding::Code,
                Binding::FailingTests,
                Binding::PytestLog,
            ],
        }
    }

    /// Bindings the template may reference but the caller may omit.
    pub fn optional_bindings(&self) -> &'static [Binding] {
        match self {
            Strategy::AutoRepair => &[Binding::PreviousTest],
            _ => &[],
        }
    }

    pub fn accepts(&self, binding: Binding) -> bool {
        self.required_bindings().contains(&binding) || self.optional_bindings().contains(&binding)
    }

    fn builtin_template(&self) -> &'static str {
        match self {
            Strategy::ZeroShot => ZERO_SHOT_TEMPLATE,
            Strategy::FewShot => FEW_SHOT_TEMPLATE,
            Strategy::Structured => STRUCTURED_TEMPLATE,
            Strategy::AutoRepair => AUTO_REPAIR_TEMPLATE,
        }
    }

    /// File name looked up in a templates override directory.
    pub fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = TinyTestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().replace('-', "_").as_str() {
            "zero_shot" => Ok(Strategy::ZeroShot),
            "few_shot" => Ok(Strategy::FewShot),
            "structured" => Ok(Strategy::Structured),
            "auto_repair" => Ok(Strategy::AutoRepair),
            _ => Err(TinyTestError::UnknownStrategy(s.to_string())),
        }
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// A named substitution value required by a strategy's template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    ModuleName,
    FunctionName,
    Code,
    FailingTests,
    PreviousTest,
    PytestLog,
}

impl Binding {
    pub const ALL: [Binding; 6] = [
        Binding::ModuleName,
        Binding::FunctionName,
        Binding::Code,
        Binding::FailingTests,
        Binding::PreviousTest,
        Binding::PytestLog,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Binding::ModuleName => "module_name",
            Binding::FunctionName => "function_name",
            Binding::Code => "code",
            Binding::FailingTests => "failing_tests",
            Binding::PreviousTest => "previous_test",
            Binding::PytestLog => "pytest_log",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values to substitute into a template, keyed by [`Binding`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings<'a> {
    values: BTreeMap<Binding, &'a str>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, binding: Binding, value: &'a str) -> Self {
        self.insert(binding, value);
        self
    }

    pub fn insert(&mut self, binding: Binding, value: &'a str) {
        self.values.insert(binding, value);
    }

    pub fn remove(&mut self, binding: Binding) -> Option<&'a str> {
        self.values.remove(&binding)
    }

    pub fn get(&self, binding: Binding) -> Option<&'a str> {
        self.values.get(&binding).copied()
    }

    pub fn contains(&self, binding: Binding) -> bool {
        self.values.contains_key(&binding)
    }
}

// ============================================================================
// Template parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Package,
    Placeholder(Binding),
}

#[derive(Debug, Clone, PartialEq)]
struct Template {
    segments: Vec<Segment>,
}

impl Template {
    fn parse(strategy: Strategy, text: &str) -> Result<Self> {
        let invalid = |message: String| TinyTestError::Template { strategy, message };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        let mut offset = 0;

        while let Some(pos) = rest.find(['{', '}']) {
            literal.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                literal.push('{');
                offset += pos + 2;
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with("}}") {
                literal.push('}');
                offset += pos + 2;
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                return Err(invalid(format!(
                    "single `}}` at byte {} (write `}}}}` for a literal brace)",
                    offset + pos
                )));
            }

            let close = tail
                .find('}')
                .ok_or_else(|| invalid(format!("unclosed placeholder at byte {}", offset + pos)))?;
            let name = &tail[1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!(
                    "malformed placeholder `{{{}}}` at byte {}",
                    name,
                    offset + pos
                )));
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            if name == PACKAGE_PLACEHOLDER {
                segments.push(Segment::Package);
            } else {
                let binding = Binding::from_name(name)
                    .ok_or_else(|| invalid(format!("unknown placeholder `{{{}}}`", name)))?;
                if !strategy.accepts(binding) {
                    return Err(invalid(format!(
                        "placeholder `{{{}}}` is not accepted by this strategy",
                        name
                    )));
                }
                segments.push(Segment::Placeholder(binding));
            }

            offset += pos + close + 1;
            rest = &tail[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Holds one parsed template per [`Strategy`] and the import package they share.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    package: String,
    templates: BTreeMap<Strategy, Template>,
}

impl TemplateRegistry {
    /// Registry with the built-in templates.
    pub fn new(package: impl Into<String>) -> Result<Self> {
        let package = package.into();
        if !is_dotted_path(&package) {
            return Err(TinyTestError::Config(format!(
                "package `{}` is not a dotted Python import path",
                package
            )));
        }

        let mut templates = BTreeMap::new();
        for strategy in Strategy::ALL {
            templates.insert(
                strategy,
                Template::parse(strategy, strategy.builtin_template())?,
            );
        }

        Ok(Self { package, templates })
    }

    /// Registry with built-ins, overridden by `<strategy>.md` files found in `dir`.
    pub fn from_dir(package: impl Into<String>, dir: &Path) -> Result<Self> {
        let mut registry = Self::new(package)?;
        for strategy in Strategy::ALL {
            let path = dir.join(strategy.file_name());
            if path.is_file() {
                let text = fs::read_to_string(&path)?;
                registry = registry.with_template(strategy, &text)?;
            }
        }
        Ok(registry)
    }

    /// Replace the template for `strategy`.
    pub fn with_template(mut self, strategy: Strategy, text: &str) -> Result<Self> {
        self.templates
            .insert(strategy, Template::parse(strategy, text)?);
        Ok(self)
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// The exact first line every candidate test file must carry.
    pub fn required_import(&self, module_name: &str, function_name: &str) -> String {
        format!(
            "from {}.{} import {}",
            self.package, module_name, function_name
        )
    }

    /// Substitute `bindings` into the template for `strategy`.
    ///
    /// Fails with [`TinyTestError::MissingBinding`] if any binding required by
    /// `strategy` is absent. Bindings the strategy does not use are ignored.
    pub fn render(&self, strategy: Strategy, bindings: &Bindings<'_>) -> Result<String> {
        if let Some(&missing) = strategy
            .required_bindings()
            .iter()
            .find(|b| !bindings.contains(**b))
        {
            return Err(TinyTestError::MissingBinding {
                strategy,
                binding: missing,
            });
        }

        let template = self.templates.get(&strategy).ok_or_else(|| {
            TinyTestError::Template {
                strategy,
                message: "no template registered".to_string(),
            }
        })?;

        let mut out = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Package => out.push_str(&self.package),
                Segment::Placeholder(binding) => {
                    out.push_str(bindings.get(*binding).unwrap_or(NOT_PROVIDED))
                }
            }
        }
        Ok(out)
    }
}
