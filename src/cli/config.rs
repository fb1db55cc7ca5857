//! `ai-rails config` command
//!
//! Get or set values in the TOML config file.
//!
//! # Usage
//! ```bash
//! ai-rails config                          # Show config file
//! ai-rails config redis.url                # Get value
//! ai-rails config redis.url rediss://...   # Set value
//! ai-rails config --effective              # Merged config incl. env overrides
//! ai-rails config --global runner.python python3.12
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{global_dir, Config};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config key (e.g., redis.url, generation.test_temperature)
    pub key: Option<String>,

    /// Value to set
    pub value: Option<String>,

    /// Show the effective config (file + environment, secrets hidden)
    #[arg(long)]
    pub effective: bool,

    /// Edit config file in $EDITOR
    #[arg(short, long)]
    pub edit: bool,

    /// Show config file paths
    #[arg(long)]
    pub path: bool,

    /// Use global config (~/.ai-rails/config.toml) instead of local
    #[arg(short, long)]
    pub global: bool,
}

fn config_path(global: bool) -> PathBuf {
    if global {
        global_dir()
            .unwrap_or_else(|| PathBuf::from(".ai-rails"))
            .join("config.toml")
    } else {
        Config::find_local_config().unwrap_or_else(|| PathBuf::from(".ai-rails").join("config.toml"))
    }
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let path = config_path(args.global);

    if args.path {
        println!("Global: {}", config_path(true).display());
        println!("Local:  {}", config_path(false).display());
        println!();
        if path.exists() {
            println!("✓ Active: {}", path.display());
        } else {
            println!("⚠ No config file found at {}", path.display());
        }
        return Ok(());
    }

    if args.effective {
        let mut config = Config::load()?;
        redact(&mut config);
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if args.edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "# ai-rails configuration\n\n")?;
            println!("Created {}", path.display());
        }
        std::process::Command::new(&editor)
            .arg(&path)
            .status()
            .with_context(|| format!("Failed to open editor: {}", editor))?;
        return Ok(());
    }

    match (&args.key, &args.value) {
        (Some(key), Some(value)) => {
            set_config_value(&path, key, value)?;
            println!("✅ Set {} = {} (in {})", key, value, path.display());
        }
        (Some(key), None) => match get_config_value(&path, key)? {
            Some(v) => println!("{}", v),
            None => println!("(not set)"),
        },
        _ => {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                println!("📋 Configuration ({}):\n", path.display());
                println!("{}", content);
            } else {
                println!("📋 No config file at {}", path.display());
                println!();
                println!("Create one with:");
                println!("  ai-rails config --edit");
                println!("  ai-rails config redis.fallback_memory false");
            }
        }
    }

    Ok(())
}

fn redact(config: &mut Config) {
    let hide = |v: &mut Option<String>| {
        if v.is_some() {
            *v = Some("***".to_string());
        }
    };
    hide(&mut config.openrouter.api_key);
    hide(&mut config.vector.token);
    hide(&mut config.embeddings.api_key);
    config.redis.url = crate::core::store::redact_url(&config.redis.url);
}

/// Set `section.key` (or a top-level key) and write the file back, keeping comments
pub fn set_config_value(path: &Path, key: &str, val: &str) -> Result<()> {
    use toml_edit::{value, DocumentMut};

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };
    let mut doc: DocumentMut = content.parse().context("Failed to parse config.toml")?;

    match key.split('.').collect::<Vec<_>>().as_slice() {
        [name] => doc[*name] = value(parse_toml_value(val)),
        [section, name] => {
            if doc.get(section).is_none() {
                doc[*section] = toml_edit::table();
            }
            doc[*section][*name] = value(parse_toml_value(val));
        }
        _ => anyhow::bail!("Key too deep: {}. Max depth is section.key", key),
    }

    // Reject values that would make the file unloadable
    toml::from_str::<Config>(&doc.to_string())
        .with_context(|| format!("Invalid value for {}: {}", key, val))?;

    fs::write(path, doc.to_string())?;
    Ok(())
}

pub fn get_config_value(path: &Path, key: &str) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let doc: toml::Value = toml::from_str(&content).context("Failed to parse config.toml")?;

    let val = match key.split('.').collect::<Vec<_>>().as_slice() {
        [name] => doc.get(name),
        [section, name] => doc.get(section).and_then(|t| t.get(name)),
        _ => None,
    };

    Ok(val.map(|v| match v {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

fn parse_toml_value(s: &str) -> toml_edit::Value {
    if let Ok(b) = s.parse::<bool>() {
        return b.into();
    }
    if let Ok(i) = s.parse::<i64>() {
        return i.into();
    }
    if let Ok(f) = s.parse::<f64>() {
        return f.into();
    }
    s.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ai-rails").join("config.toml");

        set_config_value(&path, "redis.url", "redis://cache:6379").unwrap();
        set_config_value(&path, "redis.fallback_memory", "false").unwrap();
        set_config_value(&path, "generation.test_temperature", "0.5").unwrap();

        assert_eq!(
            get_config_value(&path, "redis.url").unwrap().as_deref(),
            Some("redis://cache:6379")
        );
        assert_eq!(
            get_config_value(&path, "redis.fallback_memory").unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(get_config_value(&path, "redis.missing").unwrap(), None);

        let config = Config::load_from(&path).unwrap();
        assert!(!config.redis.fallback_memory);
        assert_eq!(config.generation.test_temperature, 0.5);
    }

    #[test]
    fn test_set_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# my settings\n[runner]\npython = \"python3\"\n").unwrap();

        set_config_value(&path, "runner.timeout_secs", "60").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# my settings"));
        assert!(content.contains("timeout_secs = 60"));
    }

    #[test]
    fn test_rejects_bad_type_and_deep_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(set_config_value(&path, "server.approval_port", "not-a-port").is_err());
        assert!(set_config_value(&path, "a.b.c", "1").is_err());
        assert!(!path.exists());
    }
}
