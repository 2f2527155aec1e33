//! File-backed migration source
//!
//! Scripts live in one directory and are named `<id>_<description>.sql`,
//! for example `20240105093000_create_users_table.sql`. The id is the token
//! before the first underscore; the remaining tokens joined with spaces form
//! the description.

use std::fs;
use std::path::{Path, PathBuf};

use crate::change::{sort_unique, Change, ChangeId};
use crate::error::{MigrationError, MigrationResult};
use crate::reader::MigrationReader;
use crate::variables::{VariableReplacer, Variables};

/// File name of the unrecorded bootstrap script
pub const BOOTSTRAP_SCRIPT: &str = "bootstrap.sql";

const SCRIPT_EXTENSION: &str = "sql";

/// Discovers migrations in a scripts directory
#[derive(Debug, Clone)]
pub struct FileMigrationSource {
    scripts_dir: PathBuf,
    reader: MigrationReader,
}

impl FileMigrationSource {
    /// Source over `scripts_dir`, substituting `variables` minus reserved settings.
    pub fn new(scripts_dir: impl Into<PathBuf>, variables: &Variables) -> Self {
        let replacer = VariableReplacer::new(vec![variables.without_settings()]);
        Self::with_reader(scripts_dir, MigrationReader::new(replacer))
    }

    pub fn with_reader(scripts_dir: impl Into<PathBuf>, reader: MigrationReader) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            reader,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn list_changes(&self) -> MigrationResult<Vec<Change>> {
        let entries =
            fs::read_dir(&self.scripts_dir).map_err(|e| MigrationError::io(&self.scripts_dir, e))?;

        let mut changes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::io(&self.scripts_dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != SCRIPT_EXTENSION) {
                continue;
            }

            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                return Err(MigrationError::Parse {
                    file: path.display().to_string(),
                    message: "file name is not valid UTF-8".to_string(),
                });
            };
            if filename == BOOTSTRAP_SCRIPT {
                continue;
            }

            changes.push(parse_change(filename)?);
        }

        sort_unique(changes)
    }

    pub fn open_script(&self, change: &Change, undo: bool) -> MigrationResult<String> {
        let filename = change.filename.as_deref().ok_or_else(|| MigrationError::Parse {
            file: change.id.to_string(),
            message: "change has no script file".to_string(),
        })?;
        let path = self.scripts_dir.join(filename);
        let text = fs::read_to_string(&path).map_err(|e| MigrationError::io(&path, e))?;
        Ok(self.reader.read(&text, undo))
    }

    pub fn open_bootstrap_script(&self) -> MigrationResult<Option<String>> {
        let path = self.scripts_dir.join(BOOTSTRAP_SCRIPT);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| MigrationError::io(&path, e))?;
        Ok(Some(self.reader.read(&text, false)))
    }
}

/// Build a change from a `<id>_<description>.sql` file name
fn parse_change(filename: &str) -> MigrationResult<Change> {
    let stem = filename
        .strip_suffix(&format!(".{}", SCRIPT_EXTENSION))
        .unwrap_or(filename);
    let (id_token, rest) = stem.split_once('_').unwrap_or((stem, ""));

    let id: ChangeId = id_token.parse().map_err(|_| MigrationError::Parse {
        file: filename.to_string(),
        message: format!("'{}' is not a numeric migration id", id_token),
    })?;
    let description = rest.split('_').collect::<Vec<_>>().join(" ");

    Ok(Change::new(id, description).with_filename(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_parse_change_from_filename() {
        let change = parse_change("20240105093000_create_users_table.sql").unwrap();
        assert_eq!(change.id, ChangeId::from(20240105093000));
        assert_eq!(change.description, "create users table");
        assert_eq!(change.filename.as_deref(), Some("20240105093000_create_users_table.sql"));

        let bare = parse_change("7.sql").unwrap();
        assert_eq!(bare.id, ChangeId::from(7));
        assert_eq!(bare.description, "");
    }

    #[test]
    fn test_lists_changes_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "10_ten.sql", "SELECT 10;");
        write(&dir, "9_nine.sql", "SELECT 9;");
        write(&dir, "1_create_changelog.sql", "SELECT 1;");
        write(&dir, "bootstrap.sql", "SELECT 0;");
        write(&dir, "README.md", "not a migration");

        let source = FileMigrationSource::new(dir.path(), &Variables::new());
        let changes = source.list_changes().unwrap();
        let ids: Vec<String> = changes.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "9", "10"]);
        assert_eq!(changes[0].description, "create changelog");
    }

    #[test]
    fn test_malformed_id_fails_listing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "1_ok.sql", "SELECT 1;");
        write(&dir, "first_bad.sql", "SELECT 2;");

        let err = FileMigrationSource::new(dir.path(), &Variables::new())
            .list_changes()
            .unwrap_err();
        match err {
            MigrationError::Parse { file, .. } => assert_eq!(file, "first_bad.sql"),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_fail_listing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "2_one.sql", "SELECT 1;");
        write(&dir, "2_two.sql", "SELECT 2;");

        let err = FileMigrationSource::new(dir.path(), &Variables::new())
            .list_changes()
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateId { .. }));
    }

    #[test]
    fn test_missing_directory_names_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = FileMigrationSource::new(&missing, &Variables::new())
            .list_changes()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_open_script_splits_and_filters_reserved_variables() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "1_users.sql",
            "CREATE TABLE ${schema}.users (pw TEXT DEFAULT '${password}');\n\
             --//@UNDO\n\
             DROP TABLE ${schema}.users;\n",
        );

        let variables = Variables::new()
            .with("schema", "app")
            .with("password", "secret");
        let source = FileMigrationSource::new(dir.path(), &variables);
        let change = source.list_changes().unwrap().remove(0);

        let forward = source.open_script(&change, false).unwrap();
        assert!(forward.contains("app.users"));
        assert!(forward.contains("${password}"));
        assert!(!forward.contains("secret"));

        let reverse = source.open_script(&change, true).unwrap();
        assert!(reverse.contains("DROP TABLE app.users;"));
    }

    #[test]
    fn test_open_missing_script_names_path() {
        let dir = TempDir::new().unwrap();
        let source = FileMigrationSource::new(dir.path(), &Variables::new());
        let change = Change::new(ChangeId::from(3), "gone").with_filename("3_gone.sql");
        let err = source.open_script(&change, false).unwrap_err();
        assert!(err.to_string().contains("3_gone.sql"));
    }

    #[test]
    fn test_bootstrap_script() {
        let dir = TempDir::new().unwrap();
        let source = FileMigrationSource::new(dir.path(), &Variables::new().with("db", "app"));
        assert!(source.open_bootstrap_script().unwrap().is_none());

        write(&dir, BOOTSTRAP_SCRIPT, "CREATE SCHEMA ${db};\n");
        let bootstrap = source.open_bootstrap_script().unwrap().unwrap();
        assert!(bootstrap.starts_with("CREATE SCHEMA app;"));
    }
}
