//! CLI command handlers for tinytest.
//!
//! - [`run`] - Generate, validate and repair tests for a batch of modules
//! - [`prompt`] - Preview the initial prompt for one module
//! - [`config`] - Show or create configuration files
//! - [`analyze`] - Statistics across past runs

mod analyze;
mod config;
mod prompt;
mod run;

pub use analyze::{analyze_command, AnalyzeOptions};
pub use config::{config_init_command, config_show_command};
pub use prompt::{prompt_command, render_prompt};
pub use run::{run_command, RunOptions};

use crate::config::Config;
use crate::error::Result;
use crate::render::PromptRenderer;
use crate::template::TemplateRegistry;

/// Renderer for `config`: built-in templates, or the override directory
/// when `templates_dir` is set.
pub(crate) fn build_renderer(config: &Config) -> Result<PromptRenderer> {
    let registry = match &config.templates_dir {
        Some(dir) => TemplateRegistry::from_dir(config.package.as_str(), dir)?,
        None => TemplateRegistry::new(config.package.as_str())?,
    };
    Ok(PromptRenderer::new(registry).with_signature_hint(config.signature_hint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PromptRequest;
    use crate::target::TargetFunction;
    use crate::template::Strategy;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_renderer_uses_templates_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("zero_shot.md"),
            "Write tests for {function_name} in {package}.{module_name}:\n{code}\n",
        )
        .unwrap();
        let config = Config {
            package: "src.pkg".to_string(),
            templates_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let renderer = build_renderer(&config).unwrap();
        let target = TargetFunction::new("module_001", "add", "def add(a, b):\n    return a + b\n")
            .unwrap();
        let prompt = renderer
            .build(&PromptRequest::initial(Strategy::ZeroShot, &target))
            .unwrap();
        assert_eq!(
            prompt.as_str(),
            "Write tests for add in src.pkg.module_001:\ndef add(a, b):\n    return a + b\n\n"
        );
    }

    #[test]
    fn test_build_renderer_rejects_bad_package() {
        let config = Config {
            package: "not a package".to_string(),
            ..Config::default()
        };
        assert!(build_renderer(&config).is_err());
    }
}
