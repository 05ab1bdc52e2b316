use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    definitions::{DefinitionCatalog, FlagDefinition},
    flags::{
        flag_models::{
            FlagValue, GlobalSettingsRow, PartialFlagStore, PartialFlagValue,
            ScopeOverrideRecord, ScopeOverrideRow, ScopeType,
        },
        resolver::FlagResolver,
    },
    logging::FlagLogger,
    persistence::{FlagPersistence, MemoryPersistence, PersistenceError},
};

pub fn test_catalog() -> DefinitionCatalog {
    DefinitionCatalog::builtin()
}

pub fn definition(key: &str, category: &str, default_value: FlagValue) -> FlagDefinition {
    FlagDefinition {
        key: key.to_string(),
        name: key.replace('_', " "),
        description: format!("{key} for tests"),
        category: category.to_string(),
        default_value,
    }
}

pub fn partial_store(entries: &[(&str, PartialFlagValue)]) -> PartialFlagStore {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

/// A resolver over the builtin catalog that logs nowhere but `tracing`.
pub fn setup_resolver(persistence: &MockPersistence) -> FlagResolver {
    FlagResolver::new(Arc::new(test_catalog()), Arc::new(persistence.clone()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceCall {
    LoadGlobal(String),
    SaveGlobal(String),
    LoadScope(String, ScopeType),
    UpsertScope(String, ScopeType),
}

#[derive(Default)]
struct MockState {
    fail_reads: bool,
    fail_writes: bool,
    read_delay: Option<Duration>,
    calls: Vec<PersistenceCall>,
}

/// In-memory tables that record every call and can be told to fail or stall.
/// Derefs to [`MemoryPersistence`] for seeding and inspecting rows.
#[derive(Clone, Default)]
pub struct MockPersistence {
    tables: MemoryPersistence,
    state: Arc<Mutex<MockState>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fail_reads(&self, fail: bool) -> &Self {
        self.lock().fail_reads = fail;
        self
    }

    pub fn fail_writes(&self, fail: bool) -> &Self {
        self.lock().fail_writes = fail;
        self
    }

    /// Delays every read, to widen race windows.
    pub fn read_delay(&self, delay: Duration) -> &Self {
        self.lock().read_delay = Some(delay);
        self
    }

    pub fn get_calls(&self) -> Vec<PersistenceCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&PersistenceCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: PersistenceCall) -> (bool, bool, Option<Duration>) {
        let mut state = self.lock();
        state.calls.push(call);
        (state.fail_reads, state.fail_writes, state.read_delay)
    }
}

impl Deref for MockPersistence {
    type Target = MemoryPersistence;

    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

#[async_trait]
impl FlagPersistence for MockPersistence {
    async fn load_global(&self, key: &str) -> Result<Option<GlobalSettingsRow>, PersistenceError> {
        let (fail_reads, _, delay) = self.record(PersistenceCall::LoadGlobal(key.to_owned()));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail_reads {
            return Err(PersistenceError::Unavailable(
                "global settings read failed".to_string(),
            ));
        }
        self.tables.load_global(key).await
    }

    async fn save_global(&self, key: &str, value: Value) -> Result<(), PersistenceError> {
        let (_, fail_writes, _) = self.record(PersistenceCall::SaveGlobal(key.to_owned()));
        if fail_writes {
            return Err(PersistenceError::Unavailable(
                "global settings write failed".to_string(),
            ));
        }
        self.tables.save_global(key, value).await
    }

    async fn load_scope(
        &self,
        scope_id: &str,
        scope_type: ScopeType,
    ) -> Result<Option<ScopeOverrideRow>, PersistenceError> {
        let (fail_reads, _, delay) =
            self.record(PersistenceCall::LoadScope(scope_id.to_owned(), scope_type));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail_reads {
            return Err(PersistenceError::Unavailable(format!(
                "{scope_type} override read failed"
            )));
        }
        self.tables.load_scope(scope_id, scope_type).await
    }

    async fn upsert_scope(&self, record: &ScopeOverrideRecord) -> Result<(), PersistenceError> {
        let (_, fail_writes, _) = self.record(PersistenceCall::UpsertScope(
            record.scope_id.clone(),
            record.scope_type,
        ));
        if fail_writes {
            return Err(PersistenceError::Unavailable(format!(
                "{} override write failed",
                record.scope_type
            )));
        }
        self.tables.upsert_scope(record).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Value,
}

/// Keeps every entry so tests can assert on what was reported.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    fn push(&self, level: LogLevel, message: &str, metadata: &Value) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(LogEntry {
            level,
            message: message.to_string(),
            metadata: metadata.clone(),
        });
    }

    pub fn entries(&self, level: LogLevel) -> Vec<LogEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().filter(|e| e.level == level).cloned().collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries(level).len()
    }
}

impl FlagLogger for RecordingLogger {
    fn log_info(&self, message: &str, metadata: &Value) {
        self.push(LogLevel::Info, message, metadata);
    }

    fn log_warn(&self, message: &str, metadata: &Value) {
        self.push(LogLevel::Warn, message, metadata);
    }

    fn log_error(&self, message: &str, metadata: &Value) {
        self.push(LogLevel::Error, message, metadata);
    }
}
