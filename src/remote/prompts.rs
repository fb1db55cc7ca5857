//! System prompts
//!
//! Built-in prompts for each generation step, overridable by `<name>.md`
//! files in the prompts directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub const TEST_GENERATOR_PROMPT: &str = "You are an expert test engineer specializing in Test-Driven Development (TDD).
Generate comprehensive Python tests using pytest. Follow TDD principles:
1. Test behavior, not implementation
2. Include edge cases and error handling
3. Use descriptive test names: test_{what}_when_{condition}_then_{result}
4. Add docstrings to explain each test
5. Include all necessary imports

Output ONLY the test code, no explanations.";

pub const CODE_GENERATOR_PROMPT: &str = "You are an expert Python developer implementing code using Test-Driven Development.
Write clean, efficient code that passes all provided tests. Requirements:
1. Make ALL tests pass
2. Use type hints
3. Include docstrings
4. Handle all edge cases
5. Follow PEP 8
6. No test-specific hacks

Output ONLY the implementation code.";

pub const CODE_REVIEWER_PROMPT: &str = "You are an expert code reviewer. Analyze the implementation code for quality, security, and adherence to best practices. Provide a brief assessment.";

/// Generation step a system prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    TestGenerator,
    CodeGenerator,
    CodeReviewer,
}

impl PromptKind {
    /// File stem looked up in the prompts directory
    pub fn file_stem(self) -> &'static str {
        match self {
            PromptKind::TestGenerator => "test_generator",
            PromptKind::CodeGenerator => "code_generator",
            PromptKind::CodeReviewer => "code_reviewer",
        }
    }

    pub fn builtin(self) -> &'static str {
        match self {
            PromptKind::TestGenerator => TEST_GENERATOR_PROMPT,
            PromptKind::CodeGenerator => CODE_GENERATOR_PROMPT,
            PromptKind::CodeReviewer => CODE_REVIEWER_PROMPT,
        }
    }
}

/// Resolved system prompts for the three generation steps
#[derive(Debug, Clone, PartialEq)]
pub struct SystemPrompts {
    pub test_generator: String,
    pub code_generator: String,
    pub code_reviewer: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            test_generator: TEST_GENERATOR_PROMPT.to_string(),
            code_generator: CODE_GENERATOR_PROMPT.to_string(),
            code_reviewer: CODE_REVIEWER_PROMPT.to_string(),
        }
    }
}

impl SystemPrompts {
    /// Use prompt files where present, built-ins otherwise
    pub fn resolve(loader: &mut PromptLoader) -> Self {
        let mut pick = |kind: PromptKind| match loader.load(kind.file_stem()) {
            Ok(content) => content,
            Err(_) => kind.builtin().to_string(),
        };
        Self {
            test_generator: pick(PromptKind::TestGenerator),
            code_generator: pick(PromptKind::CodeGenerator),
            code_reviewer: pick(PromptKind::CodeReviewer),
        }
    }

    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::TestGenerator => &self.test_generator,
            PromptKind::CodeGenerator => &self.code_generator,
            PromptKind::CodeReviewer => &self.code_reviewer,
        }
    }
}

/// Loads markdown prompts from a directory, caching each one
#[derive(Debug)]
pub struct PromptLoader {
    dir: PathBuf,
    cache: HashMap<String, String>,
}

impl PromptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `<name>.md`
    pub fn load(&mut self, name: &str) -> Result<String> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }

        let path = self.dir.join(format!("{}.md", name));
        if !path.exists() {
            anyhow::bail!("Prompt file not found: {}", path.display());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!("Loaded prompt {} from {}", name, path.display());
        self.cache.insert(name.to_string(), content.clone());
        Ok(content)
    }

    /// Names of all prompts in the directory, sorted
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    /// Clear the cache so the next load hits the disk
    pub fn reload(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_generator.md");
        std::fs::write(&path, "v1").unwrap();

        let mut loader = PromptLoader::new(dir.path());
        assert_eq!(loader.load("test_generator").unwrap(), "v1");

        std::fs::write(&path, "v2").unwrap();
        assert_eq!(loader.load("test_generator").unwrap(), "v1");

        loader.reload();
        assert_eq!(loader.load("test_generator").unwrap(), "v2");
    }

    #[test]
    fn test_missing_prompt_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = PromptLoader::new(dir.path());
        let err = loader.load("nope").unwrap_err();
        assert!(err.to_string().contains("Prompt file not found"));
    }

    #[test]
    fn test_list_only_markdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "").unwrap();
        std::fs::write(dir.path().join("a.md"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let loader = PromptLoader::new(dir.path());
        assert_eq!(loader.list(), vec!["a", "b"]);
        assert!(PromptLoader::new(dir.path().join("missing")).list().is_empty());
    }

    #[test]
    fn test_resolve_mixes_files_and_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("code_reviewer.md"), "Be strict.").unwrap();

        let prompts = SystemPrompts::resolve(&mut PromptLoader::new(dir.path()));
        assert_eq!(prompts.code_reviewer, "Be strict.");
        assert_eq!(prompts.test_generator, TEST_GENERATOR_PROMPT);
        assert_eq!(prompts.get(PromptKind::CodeGenerator), CODE_GENERATOR_PROMPT);
    }
}
