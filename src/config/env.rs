//! Hierarchical `.env` loading
//!
//! Files are read in this order, later overriding earlier:
//!
//! 1. `~/.ai-rails/.env.global`
//! 2. `.env.defaults`
//! 3. `.env.project`
//! 4. `.env.local`
//! 5. `.env`
//!
//! Merged values are exported to the process environment, except for
//! variables the caller already had set.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

const GITIGNORE_ENTRIES: [&str; 3] = [".env", ".env.local", ".env.project"];

/// One level of the env hierarchy
#[derive(Debug, Clone)]
pub struct EnvFile {
    pub label: &'static str,
    pub path: PathBuf,
}

/// Presence report for one env file
#[derive(Debug, Clone)]
pub struct EnvFileStatus {
    pub label: &'static str,
    pub path: PathBuf,
    pub size: Option<u64>,
}

/// Result of `init`
#[derive(Debug, Default)]
pub struct InitReport {
    pub created: Vec<PathBuf>,
    pub gitignore_updated: bool,
    pub loaded_files: usize,
    pub total_settings: usize,
}

pub struct EnvManager {
    project_path: PathBuf,
    global_dir: Option<PathBuf>,
    loaded_files: Vec<PathBuf>,
}

impl EnvManager {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            global_dir: super::global_dir(),
            loaded_files: Vec::new(),
        }
    }

    /// Manager for the current directory
    pub fn current() -> Result<Self> {
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        Ok(Self::new(cwd))
    }

    /// Override the global directory (normally `~/.ai-rails`)
    pub fn with_global_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_dir = Some(dir.into());
        self
    }

    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    /// Files in load order
    pub fn hierarchy(&self) -> Vec<EnvFile> {
        let mut files = Vec::with_capacity(5);
        if let Some(global) = &self.global_dir {
            files.push(EnvFile {
                label: "Global Config",
                path: global.join(".env.global"),
            });
        }
        for (label, name) in [
            ("Project Defaults", ".env.defaults"),
            ("Project Config", ".env.project"),
            ("Local Overrides", ".env.local"),
            ("Main Config", ".env"),
        ] {
            files.push(EnvFile {
                label,
                path: self.project_path.join(name),
            });
        }
        files
    }

    /// Read and merge every existing file without touching the environment
    pub fn merged(&mut self) -> Result<BTreeMap<String, String>> {
        let mut merged = BTreeMap::new();
        self.loaded_files.clear();

        for file in self.hierarchy() {
            if !file.path.exists() {
                continue;
            }
            let iter = dotenvy::from_path_iter(&file.path)
                .with_context(|| format!("Failed to open {}", file.path.display()))?;
            for item in iter {
                let (key, value) =
                    item.with_context(|| format!("Failed to parse {}", file.path.display()))?;
                merged.insert(key, value);
            }
            debug!("Loaded env file {}", file.path.display());
            self.loaded_files.push(file.path);
        }

        Ok(merged)
    }

    /// Merge the hierarchy and export it; variables already set are left alone
    pub fn load(&mut self) -> Result<BTreeMap<String, String>> {
        let merged = self.merged()?;
        for (key, value) in &merged {
            if value.is_empty() || std::env::var_os(key).is_some() {
                continue;
            }
            std::env::set_var(key, value);
        }
        Ok(merged)
    }

    /// Write the global template if missing
    pub fn create_global_template(&self) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.global_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(".env.global");
        if path.exists() {
            return Ok(None);
        }
        std::fs::write(&path, GLOBAL_TEMPLATE)?;
        info!("Created global config template at {}", path.display());
        Ok(Some(path))
    }

    /// Write the project template if missing
    pub fn create_project_template(&self) -> Result<Option<PathBuf>> {
        let path = self.project_path.join(".env.project");
        if path.exists() {
            return Ok(None);
        }
        std::fs::write(&path, project_template(&self.project_path))?;
        info!("Created project template at {}", path.display());
        Ok(Some(path))
    }

    /// Create templates, seed `.env.defaults`, update `.gitignore`, then load
    pub fn init(&mut self) -> Result<InitReport> {
        let mut report = InitReport::default();

        report.created.extend(self.create_global_template()?);
        report.created.extend(self.create_project_template()?);

        let example = self.project_path.join(".env.example");
        let defaults = self.project_path.join(".env.defaults");
        if example.exists() && !defaults.exists() {
            std::fs::copy(&example, &defaults)
                .with_context(|| format!("Failed to copy {}", example.display()))?;
            report.created.push(defaults);
        }

        report.gitignore_updated = self.update_gitignore()?;

        let merged = self.load()?;
        report.loaded_files = self.loaded_files.len();
        report.total_settings = merged.len();
        Ok(report)
    }

    /// Append missing env entries to an existing `.gitignore`
    fn update_gitignore(&self) -> Result<bool> {
        let path = self.project_path.join(".gitignore");
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&path)?;
        let existing: Vec<&str> = content.lines().map(str::trim).collect();
        let missing: Vec<&str> = GITIGNORE_ENTRIES
            .iter()
            .copied()
            .filter(|e| !existing.contains(e))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "\n# AI Rails environment files")?;
        for entry in missing {
            writeln!(file, "{}", entry)?;
        }
        Ok(true)
    }

    /// Existence and size of each file in the hierarchy
    pub fn status(&self) -> Vec<EnvFileStatus> {
        self.hierarchy()
            .into_iter()
            .map(|f| EnvFileStatus {
                size: std::fs::metadata(&f.path).ok().map(|m| m.len()),
                label: f.label,
                path: f.path,
            })
            .collect()
    }
}

/// Load the hierarchy for the current directory
pub fn load_ai_rails_env() -> Result<BTreeMap<String, String>> {
    EnvManager::current()?.load()
}

fn project_template(project_path: &Path) -> String {
    let name = project_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    PROJECT_TEMPLATE
        .replace("{name}", &name)
        .replace("{path}", &project_path.display().to_string())
}

const GLOBAL_TEMPLATE: &str = "# AI Rails Global Configuration
# API keys and shared infrastructure used by every AI Rails project

# =============================================================================
# AI MODEL KEYS
# =============================================================================
OPENROUTER_API_KEY=sk-or-...your-key-here...
OPENAI_API_KEY=sk-...your-key-here...

# =============================================================================
# SHARED INFRASTRUCTURE (Upstash)
# =============================================================================
UPSTASH_REDIS_URL=rediss://:YOUR_PASSWORD@YOUR_ENDPOINT.upstash.io:6379
UPSTASH_VECTOR_URL=https://YOUR_VECTOR_ENDPOINT.upstash.io
UPSTASH_VECTOR_TOKEN=YOUR_VECTOR_TOKEN

# =============================================================================
# GLOBAL DEFAULTS (can be overridden per project)
# =============================================================================
LOG_LEVEL=INFO
ENABLE_REDIS_FALLBACK=true
ENABLE_VECTOR_SEARCH=true
";

const PROJECT_TEMPLATE: &str = "# AI Rails Project-Specific Configuration
# Loaded after the global config, so values here override global ones

# =============================================================================
# PROJECT IDENTIFICATION
# =============================================================================
PROJECT_NAME={name}
PROJECT_PATH={path}

# =============================================================================
# LOCAL SERVICES
# =============================================================================
APPROVAL_SERVER_PORT=8000
TEST_RUNNER_PORT=8001
WEBHOOK_BASE_URL=http://localhost:8000

# =============================================================================
# TEST & CODE GENERATION SETTINGS
# =============================================================================
TEST_GENERATION_TEMPERATURE=0.7
CODE_GENERATION_TEMPERATURE=0.3
TEST_GENERATION_MAX_TOKENS=4000
CODE_GENERATION_MAX_TOKENS=4000
TEST_EXECUTION_TIMEOUT=30

# =============================================================================
# PROJECT OVERRIDES
# =============================================================================
# APPROVAL_REQUEST_TTL=3600
# REDIS_KEY_PREFIX=ai_rails_
";

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(project: &Path, global: &Path) -> EnvManager {
        EnvManager::new(project).with_global_dir(global)
    }

    #[test]
    fn test_later_files_override_earlier() {
        let project = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        std::fs::write(global.path().join(".env.global"), "A=global\nB=global\n").unwrap();
        std::fs::write(project.path().join(".env.defaults"), "B=defaults\nC=defaults\n").unwrap();
        std::fs::write(project.path().join(".env"), "C=main\n").unwrap();

        let mut mgr = manager(project.path(), global.path());
        let merged = mgr.merged().unwrap();
        assert_eq!(merged["A"], "global");
        assert_eq!(merged["B"], "defaults");
        assert_eq!(merged["C"], "main");
        assert_eq!(mgr.loaded_files().len(), 3);
    }

    #[test]
    fn test_load_does_not_override_existing_env() {
        let project = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        let fresh = "AI_RAILS_ENV_TEST_FRESH_7F3A";
        let preset = "AI_RAILS_ENV_TEST_PRESET_7F3A";
        std::env::set_var(preset, "caller");
        std::fs::write(
            project.path().join(".env"),
            format!("{}=from_file\n{}=from_file\n", fresh, preset),
        )
        .unwrap();

        manager(project.path(), global.path()).load().unwrap();
        assert_eq!(std::env::var(fresh).unwrap(), "from_file");
        assert_eq!(std::env::var(preset).unwrap(), "caller");
    }

    #[test]
    fn test_init_creates_templates_and_gitignore_entries() {
        let project = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join(".env.example"), "X=1\n").unwrap();
        std::fs::write(project.path().join(".gitignore"), "target/\n.env\n").unwrap();

        let mut mgr = manager(project.path(), global.path());
        let report = mgr.init().unwrap();

        assert!(global.path().join(".env.global").exists());
        assert!(project.path().join(".env.project").exists());
        assert!(project.path().join(".env.defaults").exists());
        assert_eq!(report.created.len(), 3);
        assert!(report.gitignore_updated);

        let gitignore = std::fs::read_to_string(project.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".env\n").count(), 1);
        assert!(gitignore.contains(".env.local"));
        assert!(gitignore.contains(".env.project"));

        // Second run is a no-op
        let again = mgr.init().unwrap();
        assert!(again.created.is_empty());
        assert!(!again.gitignore_updated);
    }

    #[test]
    fn test_project_template_names_project() {
        let template = project_template(Path::new("/work/email-validator"));
        assert!(template.contains("PROJECT_NAME=email-validator"));
        assert!(template.contains("PROJECT_PATH=/work/email-validator"));
    }

    #[test]
    fn test_status_reports_sizes() {
        let project = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join(".env.local"), "K=v\n").unwrap();

        let status = manager(project.path(), global.path()).status();
        assert_eq!(status.len(), 5);
        let local = status.iter().find(|s| s.label == "Local Overrides").unwrap();
        assert_eq!(local.size, Some(4));
        assert!(status.iter().filter(|s| s.size.is_none()).count() == 4);
    }
}
