//! Hook pipeline
//!
//! Hooks bracket a run (`before`/`after`) and every applied change
//! (`before_each`/`after_each`). Any hook failure aborts the operation.
//!
//! Hooks are configured per environment with settings such as
//! `hook_before_up = "sql:audit_start.sql:table=AUDIT"`: a language, a file
//! under the hooks directory, and optional `key=value` options that take
//! precedence over environment variables inside the hook script.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::backends::{release, ConnectionProvider};
use crate::change::Change;
use crate::config::{DatabaseOperationOptions, Environment, SettingKey};
use crate::error::{MigrationError, MigrationResult};
use crate::runner::{ScriptReport, ScriptRunner};
use crate::variables::{VariableReplacer, Variables};

/// Binding holding the id of the change being applied
pub const CHANGE_ID_BINDING: &str = "change.id";
/// Binding holding the description of the change being applied
pub const CHANGE_DESCRIPTION_BINDING: &str = "change.description";

/// State handed to every hook invocation of one run
pub struct HookContext {
    /// Free-form values shared across the hook calls of one run
    pub bindings: BTreeMap<String, String>,
    change: Option<Change>,
    database: Arc<dyn ConnectionProvider>,
    options: DatabaseOperationOptions,
}

impl HookContext {
    pub fn new(database: Arc<dyn ConnectionProvider>, options: DatabaseOperationOptions) -> Self {
        Self {
            bindings: BTreeMap::new(),
            change: None,
            database,
            options,
        }
    }

    /// Change currently being applied, set only for `before_each`/`after_each`
    pub fn change(&self) -> Option<&Change> {
        self.change.as_ref()
    }

    pub(crate) fn set_change(&mut self, change: Option<&Change>) {
        match change {
            Some(change) => {
                self.bindings
                    .insert(CHANGE_ID_BINDING.to_string(), change.id.to_string());
                self.bindings.insert(
                    CHANGE_DESCRIPTION_BINDING.to_string(),
                    change.description.clone(),
                );
            }
            None => {
                self.bindings.remove(CHANGE_ID_BINDING);
                self.bindings.remove(CHANGE_DESCRIPTION_BINDING);
            }
        }
        self.change = change.cloned();
    }

    /// Run SQL against the target database with the run's options
    pub async fn execute_sql(&self, sql: &str) -> MigrationResult<ScriptReport> {
        let mut session = self.database.connect().await?;
        let outcome = ScriptRunner::new(&self.options)
            .run(session.as_mut(), sql)
            .await;
        release(session, outcome).await
    }
}

/// Extension points around an operation
#[async_trait]
pub trait MigrationHook: Send + Sync {
    async fn before(&self, _context: &mut HookContext) -> MigrationResult<()> {
        Ok(())
    }

    async fn before_each(&self, _context: &mut HookContext) -> MigrationResult<()> {
        Ok(())
    }

    async fn after_each(&self, _context: &mut HookContext) -> MigrationResult<()> {
        Ok(())
    }

    async fn after(&self, _context: &mut HookContext) -> MigrationResult<()> {
        Ok(())
    }
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHook;

impl MigrationHook for NoOpHook {}

/// One executable hook script
#[async_trait]
pub trait HookScript: Send + Sync {
    async fn execute(&self, context: &mut HookContext) -> MigrationResult<()>;
}

/// Hook script made of SQL read from a file
pub struct SqlHook {
    path: PathBuf,
    replacer: VariableReplacer,
}

impl SqlHook {
    /// `local` options win over `environment` variables; reserved keys are dropped from both.
    pub fn new(path: impl Into<PathBuf>, local: &Variables, environment: &Variables) -> Self {
        Self {
            path: path.into(),
            replacer: VariableReplacer::new(vec![
                local.without_settings(),
                environment.without_settings(),
            ]),
        }
    }
}

#[async_trait]
impl HookScript for SqlHook {
    async fn execute(&self, context: &mut HookContext) -> MigrationResult<()> {
        let text = fs::read_to_string(&self.path).map_err(|e| MigrationError::io(&self.path, e))?;
        debug!("Running SQL hook {}", self.path.display());
        context.execute_sql(&self.replacer.replace(&text)).await?;
        Ok(())
    }
}

/// Phase of a run at which a hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Before,
    BeforeEach,
    AfterEach,
    After,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookPhase::Before => "before",
            HookPhase::BeforeEach => "before_each",
            HookPhase::AfterEach => "after_each",
            HookPhase::After => "after",
        })
    }
}

/// Direction of the hooks being configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDirection {
    Up,
    Down,
}

impl HookDirection {
    fn setting(&self, phase: HookPhase) -> SettingKey {
        match (self, phase) {
            (HookDirection::Up, HookPhase::Before) => SettingKey::HookBeforeUp,
            (HookDirection::Up, HookPhase::BeforeEach) => SettingKey::HookBeforeEachUp,
            (HookDirection::Up, HookPhase::AfterEach) => SettingKey::HookAfterEachUp,
            (HookDirection::Up, HookPhase::After) => SettingKey::HookAfterUp,
            (HookDirection::Down, HookPhase::Before) => SettingKey::HookBeforeDown,
            (HookDirection::Down, HookPhase::BeforeEach) => SettingKey::HookBeforeEachDown,
            (HookDirection::Down, HookPhase::AfterEach) => SettingKey::HookAfterEachDown,
            (HookDirection::Down, HookPhase::After) => SettingKey::HookAfterDown,
        }
    }
}

/// Hook assembled from one optional script per phase
#[derive(Default, Clone)]
pub struct ConfiguredHook {
    before: Option<Arc<dyn HookScript>>,
    before_each: Option<Arc<dyn HookScript>>,
    after_each: Option<Arc<dyn HookScript>>,
    after: Option<Arc<dyn HookScript>>,
}

impl ConfiguredHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, phase: HookPhase, script: Arc<dyn HookScript>) -> Self {
        let slot = match phase {
            HookPhase::Before => &mut self.before,
            HookPhase::BeforeEach => &mut self.before_each,
            HookPhase::AfterEach => &mut self.after_each,
            HookPhase::After => &mut self.after,
        };
        *slot = Some(script);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_none()
            && self.before_each.is_none()
            && self.after_each.is_none()
            && self.after.is_none()
    }

    async fn fire(
        script: &Option<Arc<dyn HookScript>>,
        phase: HookPhase,
        context: &mut HookContext,
    ) -> MigrationResult<()> {
        let Some(script) = script else {
            return Ok(());
        };
        script.execute(context).await.map_err(|err| match err {
            MigrationError::Hook { .. } => err,
            other => MigrationError::Hook {
                hook: phase.to_string(),
                message: other.to_string(),
            },
        })
    }
}

#[async_trait]
impl MigrationHook for ConfiguredHook {
    async fn before(&self, context: &mut HookContext) -> MigrationResult<()> {
        Self::fire(&self.before, HookPhase::Before, context).await
    }

    async fn before_each(&self, context: &mut HookContext) -> MigrationResult<()> {
        Self::fire(&self.before_each, HookPhase::BeforeEach, context).await
    }

    async fn after_each(&self, context: &mut HookContext) -> MigrationResult<()> {
        Self::fire(&self.after_each, HookPhase::AfterEach, context).await
    }

    async fn after(&self, context: &mut HookContext) -> MigrationResult<()> {
        Self::fire(&self.after, HookPhase::After, context).await
    }
}

/// Parsed `<language>:<file>[:key=value...]` hook setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    pub language: String,
    pub file: PathBuf,
    pub options: Variables,
}

impl HookSpec {
    /// Parse a hook setting, resolving the file against `hooks_dir`.
    pub fn parse(value: &str, hooks_dir: &Path) -> MigrationResult<Self> {
        let mut parts = value.split(':');
        let language = parts.next().unwrap_or_default().trim();
        let file = parts.next().unwrap_or_default().trim();
        if language.is_empty() || file.is_empty() {
            return Err(MigrationError::configuration(format!(
                "Invalid hook setting '{}': expected <language>:<file>[:key=value...]",
                value
            )));
        }

        let mut options = Variables::new();
        for option in parts {
            let (key, val) = option.split_once('=').ok_or_else(|| {
                MigrationError::configuration(format!(
                    "Invalid hook option '{}' in '{}': expected key=value",
                    option, value
                ))
            })?;
            options.insert(key.trim(), val.trim());
        }

        Ok(Self {
            language: language.to_lowercase(),
            file: hooks_dir.join(file),
            options,
        })
    }
}

/// Builds a [`HookScript`] for a non-SQL language
pub type HookScriptFactory =
    Arc<dyn Fn(&HookSpec, &Environment) -> MigrationResult<Arc<dyn HookScript>> + Send + Sync>;

/// Resolves hook settings into hooks.
///
/// SQL hooks are built in; other languages must be registered by the
/// embedding program.
#[derive(Clone)]
pub struct HookRegistry {
    hooks_dir: PathBuf,
    factories: BTreeMap<String, HookScriptFactory>,
}

impl HookRegistry {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            factories: BTreeMap::new(),
        }
    }

    pub fn register(mut self, language: &str, factory: HookScriptFactory) -> Self {
        self.factories.insert(language.to_lowercase(), factory);
        self
    }

    /// Hook for `direction` from the environment's `hook_*` settings
    pub fn build(
        &self,
        environment: &Environment,
        direction: HookDirection,
    ) -> MigrationResult<ConfiguredHook> {
        let mut hook = ConfiguredHook::new();
        for phase in [
            HookPhase::Before,
            HookPhase::BeforeEach,
            HookPhase::AfterEach,
            HookPhase::After,
        ] {
            if let Some(setting) = environment.hook_setting(direction.setting(phase)) {
                let spec = HookSpec::parse(setting, &self.hooks_dir)?;
                hook = hook.with_script(phase, self.script_for(&spec, environment)?);
            }
        }
        Ok(hook)
    }

    fn script_for(
        &self,
        spec: &HookSpec,
        environment: &Environment,
    ) -> MigrationResult<Arc<dyn HookScript>> {
        if spec.language == "sql" {
            return Ok(Arc::new(SqlHook::new(
                &spec.file,
                &spec.options,
                environment.variables(),
            )));
        }
        match self.factories.get(&spec.language) {
            Some(factory) => factory(spec, environment),
            None => Err(MigrationError::configuration(format!(
                "No hook runtime registered for language '{}' ({})",
                spec.language,
                spec.file.display()
            ))),
        }
    }
}
