//! # Migration Generator
//!
//! Scaffolds the next migration unit as `<migrations_dir>/<d.d>/migration.yaml`
//! with a checksum line the loader can verify.

use super::checksum::checksum_for_script;
use super::errors::{MigrationError, MigrationResult};
use super::loader::{discover_versions, SCRIPT_FILE};
use super::MigrationVersion;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Migration generator
pub struct MigrationGenerator {
    migrations_dir: PathBuf,
}

impl MigrationGenerator {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create the next migration unit and return the script path.
    pub fn create(&self, name: &str) -> MigrationResult<PathBuf> {
        if !self.migrations_dir.exists() {
            fs::create_dir_all(&self.migrations_dir).map_err(|e| MigrationError::FileWrite {
                path: self.migrations_dir.clone(),
                source: e,
            })?;
        }

        let version = self.next_version()?;
        let name = sanitize_name(name);

        let unit_dir = self.migrations_dir.join(version.to_string());
        fs::create_dir(&unit_dir).map_err(|e| MigrationError::FileWrite {
            path: unit_dir.clone(),
            source: e,
        })?;

        let file_path = unit_dir.join(SCRIPT_FILE);
        let content = render_script(version, &name, &Utc::now().to_rfc3339());
        fs::write(&file_path, content).map_err(|e| MigrationError::FileWrite {
            path: file_path.clone(),
            source: e,
        })?;

        tracing::info!(version = %version, path = %file_path.display(), "Created migration");
        Ok(file_path)
    }

    /// One step above the highest unit in the directory; 1.0 when empty.
    pub fn next_version(&self) -> MigrationResult<MigrationVersion> {
        if !self.migrations_dir.exists() {
            return Ok(MigrationVersion::from_tenths(10));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.migrations_dir).map_err(|e| MigrationError::FileRead {
            path: self.migrations_dir.clone(),
            source: e,
        })? {
            let entry = entry.map_err(|e| MigrationError::FileRead {
                path: self.migrations_dir.clone(),
                source: e,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        let last = discover_versions(&names)
            .into_iter()
            .map(|(version, _)| version)
            .max()
            .unwrap_or(MigrationVersion::ZERO);

        last.next_unit()
            .ok_or(MigrationError::VersionExhausted { last })
    }
}

/// Lowercase, anything but alphanumerics becomes `_`.
fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "migration".to_string()
    } else {
        sanitized
    }
}

fn render_script(version: MigrationVersion, name: &str, created: &str) -> String {
    let body = format!(
        r#"# Migration {version}: {name}
# Created: {created}
#
# 'up' moves the database to {version}, 'down' undoes it.

name: "{name}"
up: []
  # - create_collection:
  #     name: my_collection
down: []
  # - drop_collection:
  #     name: my_collection
"#
    );

    let checksum = checksum_for_script(&body);
    body.replacen("\nname: ", &format!("\nchecksum: \"{}\"\nname: ", checksum), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::checksum::verify_script;
    use crate::migrations::loader::MigrationScript;
    use tempfile::TempDir;

    #[test]
    fn test_create_first_migration() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");

        let generator = MigrationGenerator::new(&migrations_dir);
        let path = generator.create("create_users").unwrap();

        assert_eq!(path, migrations_dir.join("1.0").join("migration.yaml"));

        let content = fs::read_to_string(&path).unwrap();
        let script: MigrationScript = serde_yaml::from_str(&content).unwrap();
        assert_eq!(script.name, "create_users");
        assert!(script.up.is_empty());
        verify_script(&content, script.checksum.as_deref().unwrap()).unwrap();
    }

    #[test]
    fn test_create_sequential_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(temp_dir.path());

        generator.create("create_users").unwrap();
        generator.create("create_posts").unwrap();
        let path = generator.create("add_comments").unwrap();

        assert!(path.starts_with(temp_dir.path().join("1.2")));
    }

    #[test]
    fn test_next_version_ignores_foreign_entries() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("2.4")).unwrap();
        fs::create_dir(temp_dir.path().join("10.0")).unwrap();
        fs::write(temp_dir.path().join("README.md"), "notes").unwrap();

        let generator = MigrationGenerator::new(temp_dir.path());
        assert_eq!(generator.next_version().unwrap().to_string(), "2.5");
    }

    #[test]
    fn test_next_version_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("9.9")).unwrap();

        let generator = MigrationGenerator::new(temp_dir.path());
        let err = generator.create("one_too_many").unwrap_err();
        assert_eq!(err.code(), "VERSION_EXHAUSTED");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Add User's Table!"), "add_user_s_table_");
        assert_eq!(sanitize_name("  "), "migration");
    }
}
