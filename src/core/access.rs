//! Access control for blind testing
//!
//! Some directories hold the expected outputs of blind test scenarios.
//! Agents must not read them; the CLI goes through [`AccessControl`] for
//! every input file so that content from those places has to be pasted in
//! explicitly.
//!
//! Three kinds of rules:
//! - **folder**: path fragment such as `inputs-to-outputs/*-actual`, matched
//!   against consecutive path components
//! - **file**: glob on the file name, such as `*.secret`
//! - **pattern**: `**/name-*`, any single component matching the glob
//!
//! Extra rules can be listed in `.agent-restrictions`, one per line as
//! `folder: ...`, `file: ...` or `pattern: ...`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::RailsError;

pub const RESTRICTIONS_FILE: &str = ".agent-restrictions";

const DEFAULT_FOLDERS: &[&str] = &[
    "inputs-to-outputs/redis-integration-actual",
    "inputs-to-outputs/*-actual",
    "inputs-to-outputs/*-blind",
    "inputs-to-outputs/blind-test-scenarios",
    "test-isolation",
    "agent-sandbox",
    "blind-tests",
];

const DEFAULT_FILES: &[&str] = &["*.secret", ".env.production", "secrets.json"];

const DEFAULT_PATTERNS: &[&str] = &["**/blind-test-*", "**/isolated-*", "**/sandbox-*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Folder,
    File,
    Pattern,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Folder => write!(f, "folder"),
            RuleKind::File => write!(f, "file"),
            RuleKind::Pattern => write!(f, "pattern"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub pattern: String,
    regex: Regex,
}

impl Rule {
    pub fn new(kind: RuleKind, pattern: &str) -> Result<Self> {
        let source = match kind {
            RuleKind::File => format!("^{}$", glob_to_regex(pattern)),
            RuleKind::Folder => format!(
                "(^|/){}(/|$)",
                glob_to_regex(pattern.trim_matches('/'))
            ),
            RuleKind::Pattern => format!(
                "(^|/){}(/|$)",
                glob_to_regex(pattern.trim_start_matches("**/").trim_matches('/'))
            ),
        };
        let regex = Regex::new(&source)
            .with_context(|| format!("Invalid restriction pattern: {}", pattern))?;
        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            regex,
        })
    }

    fn matches(&self, normalized: &str, file_name: &str) -> bool {
        match self.kind {
            RuleKind::File => self.regex.is_match(file_name),
            RuleKind::Folder | RuleKind::Pattern => self.regex.is_match(normalized),
        }
    }
}

/// File operation being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    List,
}

pub struct AccessControl {
    rules: Vec<Rule>,
}

impl AccessControl {
    /// Built-in rules only
    pub fn new() -> Self {
        let mut rules = Vec::new();
        for (kind, patterns) in [
            (RuleKind::Folder, DEFAULT_FOLDERS),
            (RuleKind::File, DEFAULT_FILES),
            (RuleKind::Pattern, DEFAULT_PATTERNS),
        ] {
            for pattern in patterns {
                // Built-in patterns are known to compile
                if let Ok(rule) = Rule::new(kind, pattern) {
                    rules.push(rule);
                }
            }
        }
        Self { rules }
    }

    /// Built-in rules plus those in `config_file`, if it exists
    pub fn load(config_file: &Path) -> Result<Self> {
        let mut control = Self::new();
        if !config_file.exists() {
            return Ok(control);
        }

        let content = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read {}", config_file.display()))?;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((kind, pattern)) = line.split_once(':') else {
                warn!("{}:{}: expected 'kind: pattern'", config_file.display(), lineno + 1);
                continue;
            };
            let kind = match kind.trim() {
                "folder" | "folders" => RuleKind::Folder,
                "file" | "files" => RuleKind::File,
                "pattern" | "patterns" => RuleKind::Pattern,
                other => {
                    warn!("{}:{}: unknown rule kind '{}'", config_file.display(), lineno + 1, other);
                    continue;
                }
            };
            control.rules.push(Rule::new(kind, pattern.trim())?);
        }
        debug!("Loaded {} access rules", control.rules.len());
        Ok(control)
    }

    /// Rules from `.agent-restrictions` in the current directory
    pub fn from_cwd() -> Result<Self> {
        Self::load(Path::new(RESTRICTIONS_FILE))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule restricting `path`, checked both as given and with
    /// symlinks and `..` resolved
    pub fn matching_rule(&self, path: &Path) -> Option<&Rule> {
        let absolute = absolutize(path);
        self.rule_for(&absolute).or_else(|| {
            let resolved = resolve(&absolute)?;
            self.rule_for(&resolved)
        })
    }

    fn rule_for(&self, path: &Path) -> Option<&Rule> {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.rules.iter().find(|r| r.matches(&normalized, &file_name))
    }

    pub fn is_restricted(&self, path: &Path) -> bool {
        self.matching_rule(path).is_some()
    }

    pub fn validate_access(&self, path: &Path, operation: Operation) -> Result<(), RailsError> {
        if let Some(rule) = self.matching_rule(path) {
            debug!(?operation, rule = %rule.pattern, "Access denied for {}", path.display());
            return Err(RailsError::AccessDenied(path.display().to_string()));
        }
        Ok(())
    }

    /// Read a file if access is allowed
    pub fn safe_read(&self, path: &Path) -> Result<String> {
        self.validate_access(path, Operation::Read)?;
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Write a file if access is allowed
    pub fn safe_write(&self, path: &Path, content: &str) -> Result<()> {
        self.validate_access(path, Operation::Write)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// List a directory if access is allowed
    pub fn safe_list_dir(&self, path: &Path) -> Result<Vec<String>> {
        self.validate_access(path, Operation::List)?;
        let mut names: Vec<String> = std::fs::read_dir(path)
            .with_context(|| format!("Failed to list {}", path.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn restriction_message() -> &'static str {
        "Access Restriction Notice:\n\
         Certain directories are restricted for blind testing purposes.\n\
         If you need to work with content from these directories,\n\
         please paste the specific content directly into the conversation.\n\
         Restricted patterns include: *-actual/, *-blind/, test-isolation/, etc."
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new()
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Canonical form of `path`; for a file that does not exist yet, the
/// canonical parent joined with the file name
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Some(canonical);
    }
    let parent = std::fs::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

/// Translate `*` and `?` globs into a regex that stays inside one path component
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restricted(path: &str) -> bool {
        AccessControl::new().is_restricted(Path::new(path))
    }

    #[test]
    fn test_restricted_folders() {
        assert!(restricted("/p/inputs-to-outputs/redis-integration-actual/test.py"));
        assert!(restricted("/p/inputs-to-outputs/feature-blind/data.json"));
        assert!(restricted("/p/test-isolation/scenario1.py"));
        assert!(restricted("/p/agent-sandbox"));
    }

    #[test]
    fn test_allowed_paths() {
        assert!(!restricted("/p/src/main.py"));
        assert!(!restricted("/p/README.md"));
        // Component boundaries matter
        assert!(!restricted("/p/my-test-isolation-notes/readme.md"));
        assert!(!restricted("/p/other/feature-actual/x.py"));
    }

    #[test]
    fn test_restricted_files_and_patterns() {
        assert!(restricted("/p/config/db.secret"));
        assert!(restricted("/p/.env.production"));
        assert!(restricted("/p/a/b/secrets.json"));
        assert!(restricted("/p/deep/blind-test-login/case.py"));
        assert!(restricted("/p/isolated-run"));
        assert!(!restricted("/p/secrets.json.bak"));
    }

    #[test]
    fn test_validate_access_message() {
        let control = AccessControl::new();
        let err = control
            .validate_access(Path::new("/p/blind-tests/a.py"), Operation::Read)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Access denied: /p/blind-tests/a.py is in a restricted directory for blind testing. Please paste the content directly into the conversation."
        );
    }

    #[test]
    fn test_safe_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let control = AccessControl::new();

        let ok = dir.path().join("plan.md");
        control.safe_write(&ok, "# Plan").unwrap();
        assert_eq!(control.safe_read(&ok).unwrap(), "# Plan");

        let blocked_dir = dir.path().join("blind-tests");
        std::fs::create_dir(&blocked_dir).unwrap();
        let blocked = blocked_dir.join("expected.py");
        std::fs::write(&blocked, "secret").unwrap();
        assert!(control.safe_read(&blocked).is_err());
        assert!(control.safe_write(&blocked, "x").is_err());
        assert!(control.safe_list_dir(&blocked_dir).is_err());
        assert_eq!(control.safe_list_dir(dir.path()).unwrap(), vec!["blind-tests", "plan.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_restricted_dir_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let control = AccessControl::new();

        let blocked_dir = dir.path().join("blind-tests");
        std::fs::create_dir(&blocked_dir).unwrap();
        std::fs::write(blocked_dir.join("expected.py"), "SECRET").unwrap();

        let link = dir.path().join("innocent");
        std::os::unix::fs::symlink(&blocked_dir, &link).unwrap();

        assert!(control.is_restricted(&link.join("expected.py")));
        assert!(control.safe_read(&link.join("expected.py")).is_err());
        assert!(control.safe_write(&link.join("new.py"), "x").is_err());
        assert!(!link.join("new.py").exists());
        assert!(control.safe_list_dir(&link).is_err());

        let escaped = dir.path().join("src").join("..").join("blind-tests").join("expected.py");
        std::fs::create_dir(dir.path().join("src")).unwrap();
        assert!(control.is_restricted(&escaped));
    }

    #[test]
    fn test_extra_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(RESTRICTIONS_FILE);
        std::fs::write(
            &config,
            "# extra rules\nfolder: golden-outputs\nfile: *.key\nbogus line\nweird: x\n",
        )
        .unwrap();

        let control = AccessControl::load(&config).unwrap();
        assert_eq!(control.rules().len(), 13 + 2);
        assert!(control.is_restricted(Path::new("/p/golden-outputs/a.txt")));
        assert!(control.is_restricted(Path::new("/p/id.key")));
    }
}
