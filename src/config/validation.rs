use super::models::{Config, MountConfig};
use crate::context;
use crate::files::{FileAdapter, LoadingPolicy, base_name};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Configured {kind} '{}' does not exist", .path.display())]
    MissingPath { kind: &'static str, path: PathBuf },

    #[error("Configured file '{}' is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("Configured directory '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Mount '{}' sets cache_duration but its policy is {policy}", .path.display())]
    CacheDurationWithoutCache { path: PathBuf, policy: LoadingPolicy },

    #[error("File mount '{}' cannot be recursive", .0.display())]
    RecursiveFile(PathBuf),

    #[error("Two {kind} mounts resolve to the same context '{context}'")]
    DuplicateContext { kind: &'static str, context: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config, adapter: &dyn FileAdapter) -> Result<(), ValidationError> {
    validate_files(config, adapter)?;
    validate_directories(config)?;
    Ok(())
}

fn validate_files(config: &Config, adapter: &dyn FileAdapter) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for mount in &config.files {
        if !mount.path.exists() {
            return Err(ValidationError::MissingPath {
                kind: "file",
                path: mount.path.clone(),
            });
        }
        if !mount.path.is_file() {
            return Err(ValidationError::NotAFile(mount.path.clone()));
        }
        if mount.recursive {
            return Err(ValidationError::RecursiveFile(mount.path.clone()));
        }
        validate_cache_duration(mount)?;

        let name = mount
            .name
            .clone()
            .unwrap_or_else(|| adapter.name_for(&mount.path));
        check_unique(&mut seen, "file", mount, &name)?;
    }

    Ok(())
}

fn validate_directories(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for mount in &config.directories {
        if !mount.path.exists() {
            return Err(ValidationError::MissingPath {
                kind: "directory",
                path: mount.path.clone(),
            });
        }
        if !mount.path.is_dir() {
            return Err(ValidationError::NotADirectory(mount.path.clone()));
        }
        validate_cache_duration(mount)?;

        let name = mount.name.clone().unwrap_or_else(|| {
            let canonical = mount.path.canonicalize().unwrap_or_else(|_| mount.path.clone());
            base_name(&canonical)
        });
        check_unique(&mut seen, "directory", mount, &name)?;
    }

    Ok(())
}

/// cache_duration belongs to the cache policy; omitted it defaults to zero,
/// which reloads on every request
fn validate_cache_duration(mount: &MountConfig) -> Result<(), ValidationError> {
    match (mount.policy, mount.cache_duration) {
        (LoadingPolicy::Cache, _) => Ok(()),
        (policy, Some(_)) => Err(ValidationError::CacheDurationWithoutCache {
            path: mount.path.clone(),
            policy,
        }),
        (_, None) => Ok(()),
    }
}

fn check_unique(
    seen: &mut HashSet<String>,
    kind: &'static str,
    mount: &MountConfig,
    name: &str,
) -> Result<(), ValidationError> {
    let context = context::join(true, false, &[mount.context.as_str(), name]);
    if !seen.insert(context.clone()) {
        return Err(ValidationError::DuplicateContext { kind, context });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use super::*;
    use crate::files::{DefaultAdapter, StripExtension};
    use crate::humanize::HumanDuration;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn mount(path: PathBuf) -> MountConfig {
        MountConfig {
            path,
            name: None,
            context: String::new(),
            policy: LoadingPolicy::Live,
            cache_duration: None,
            recursive: false,
        }
    }

    fn create_test_config(dir: &TempDir) -> Config {
        let file = dir.path().join("index.html");
        fs::write(&file, "index").unwrap();
        let public = dir.path().join("public");
        fs::create_dir(&public).unwrap();

        Config {
            files: vec![mount(file)],
            directories: vec![mount(public)],
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);
        assert!(validate(&config, &DefaultAdapter).is_ok());
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.files.push(mount(dir.path().join("missing.txt")));

        let result = validate(&config, &DefaultAdapter);
        assert!(matches!(result, Err(ValidationError::MissingPath { kind: "file", .. })));
    }

    #[test]
    fn test_directory_mounted_as_file() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.files.push(mount(dir.path().join("public")));

        let result = validate(&config, &DefaultAdapter);
        assert!(matches!(result, Err(ValidationError::NotAFile(_))));
    }

    #[test]
    fn test_file_mounted_as_directory() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.directories.push(mount(dir.path().join("index.html")));

        let result = validate(&config, &DefaultAdapter);
        assert!(matches!(result, Err(ValidationError::NotADirectory(_))));
    }

    #[test]
    fn test_cache_policy_accepts_any_duration() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.directories[0].policy = LoadingPolicy::Cache;
        assert!(validate(&config, &DefaultAdapter).is_ok());

        config.directories[0].cache_duration = Some(HumanDuration(Duration::ZERO));
        assert!(validate(&config, &DefaultAdapter).is_ok());

        config.directories[0].cache_duration = Some(HumanDuration(Duration::from_secs(5)));
        assert!(validate(&config, &DefaultAdapter).is_ok());
    }

    #[test]
    fn test_duration_without_cache_policy() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.files[0].policy = LoadingPolicy::Modify;
        config.files[0].cache_duration = Some(HumanDuration(Duration::from_secs(5)));

        let result = validate(&config, &DefaultAdapter);
        assert!(matches!(
            result,
            Err(ValidationError::CacheDurationWithoutCache {
                policy: LoadingPolicy::Modify,
                ..
            })
        ));
    }

    #[test]
    fn test_recursive_file() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.files[0].recursive = true;

        let result = validate(&config, &DefaultAdapter);
        assert!(matches!(result, Err(ValidationError::RecursiveFile(_))));
    }

    #[test]
    fn test_duplicate_context_uses_adapter_names() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        let other = dir.path().join("index.txt");
        fs::write(&other, "other").unwrap();
        config.files.push(mount(other));

        assert!(validate(&config, &DefaultAdapter).is_ok());

        let result = validate(&config, &StripExtension);
        assert!(matches!(
            result,
            Err(ValidationError::DuplicateContext { kind: "file", ref context }) if context == "/index"
        ));
    }

    #[test]
    fn test_same_name_in_different_contexts() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        let mut alt = mount(dir.path().join("public"));
        alt.context = "alt".to_string();
        config.directories.push(alt);

        assert!(validate(&config, &DefaultAdapter).is_ok());

        config.directories.push(mount(dir.path().join("public")));
        assert!(matches!(
            validate(&config, &DefaultAdapter),
            Err(ValidationError::DuplicateContext { kind: "directory", .. })
        ));
    }
}
