//! Prompt preview: render the initial prompt for one module without
//! calling a model.

use std::path::Path;

use crate::config::{get_effective_config, validate_config, Config};
use crate::error::{Result, TinyTestError};
use crate::pipeline::load_target;
use crate::render::{PromptRequest, RenderedPrompt};

use super::build_renderer;

/// Initial prompt for `module` under `config`.
pub fn render_prompt(config: &Config, module: &Path) -> Result<RenderedPrompt> {
    let strategy = config.strategy()?;
    let target = load_target(module, Some(config.metadata_dir.as_path()))?;
    build_renderer(config)?.build(&PromptRequest::initial(strategy, &target))
}

/// Print the prompt `tinytest run` would send first for `module`.
pub fn prompt_command(module: &Path, template: Option<&str>, no_hint: bool) -> Result<()> {
    let (mut config, _) = get_effective_config()?;
    if let Some(template) = template {
        config.template = template.to_string();
    }
    if no_hint {
        config.signature_hint = false;
    }
    validate_config(&config).map_err(|e| TinyTestError::Config(e.to_string()))?;

    println!("{}", render_prompt(&config, module)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Strategy;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        let metadata = dir.path().join("metadata");
        fs::create_dir_all(&modules).unwrap();
        fs::create_dir_all(&metadata).unwrap();
        fs::write(
            modules.join("module_003.py"),
            "def is_even(n):\n    return n % 2 == 0\n",
        )
        .unwrap();
        fs::write(
            metadata.join("module_003.json"),
            r#"{"functions": [{"name": "is_even", "args": [{"name": "n", "type": "int"}], "returns": "bool"}]}"#,
        )
        .unwrap();
        let config = Config {
            modules_dir: modules,
            metadata_dir: metadata,
            ..Config::default()
        };
        (dir, config)
    }

    #[test]
    fn test_render_prompt_includes_import_and_hint() {
        let (_dir, config) = workspace();
        let prompt = render_prompt(&config, &config.modules_dir.join("module_003.py")).unwrap();

        assert_eq!(prompt.strategy(), Strategy::FewShot);
        assert!(prompt
            .as_str()
            .contains("from data.modules.module_003 import is_even"));
        assert!(prompt.as_str().contains("return n % 2 == 0"));
        assert!(prompt
            .as_str()
            .ends_with("HINT - Function: is_even, Args: n, Returns: bool\n"));
    }

    #[test]
    fn test_render_prompt_without_hint() {
        let (_dir, mut config) = workspace();
        config.signature_hint = false;
        config.template = "zero_shot".to_string();
        let prompt = render_prompt(&config, &config.modules_dir.join("module_003.py")).unwrap();

        assert_eq!(prompt.strategy(), Strategy::ZeroShot);
        assert!(!prompt.as_str().contains("HINT"));
    }

    #[test]
    fn test_render_prompt_missing_module() {
        let (_dir, config) = workspace();
        let err = render_prompt(&config, &config.modules_dir.join("module_999.py")).unwrap_err();
        assert!(matches!(err, TinyTestError::ModuleNotFound(_)));
    }
}
