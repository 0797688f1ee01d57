//! Directory enumeration sessions and the table that owns them.
//!
//! A session is a point-in-time snapshot of one directory plus a cursor. The
//! OS may need many callbacks to drain it, because each callback brings a
//! destination buffer of unknown capacity; the cursor is what lets the next
//! callback resume at the first entry the previous one could not fit.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::tree::FileMetadata;

#[derive(Debug)]
pub struct EnumerationSession {
    id: Uuid,
    path: String,
    entries: Vec<FileMetadata>,
    cursor: usize,
    search_expression: Option<String>,
    expression_set: bool,
}

impl EnumerationSession {
    pub fn new(id: Uuid, path: impl Into<String>, entries: Vec<FileMetadata>) -> Self {
        Self {
            id,
            path: path.into(),
            entries,
            cursor: 0,
            search_expression: None,
            expression_set: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Native path the enumeration was started for.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Serve from the first entry again and accept a fresh filter.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.expression_set = false;
    }

    /// Remember the active wildcard filter. Matching itself happens provider-side.
    pub fn save_expression(&mut self, pattern: &str) {
        self.search_expression = Some(pattern.to_string());
        self.expression_set = true;
    }

    pub fn search_expression(&self) -> Option<&str> {
        self.search_expression.as_deref()
    }

    pub fn is_expression_set(&self) -> bool {
        self.expression_set
    }

    /// Entry under the cursor, `None` once the snapshot is exhausted.
    pub fn current(&self) -> Option<&FileMetadata> {
        self.entries.get(self.cursor)
    }

    /// Only valid right after `current()` returned an entry.
    pub fn advance(&mut self) {
        debug_assert!(self.cursor < self.entries.len(), "advance past end of session");
        self.cursor += 1;
    }
}

/// Sessions keyed by the OS-assigned enumeration id.
///
/// Begin/end take the write lock. Serving data takes the read lock and then
/// the session's own mutex; the OS never drives one id from two threads at
/// once, so that mutex is uncontended.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<Uuid, Mutex<EnumerationSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. An id collision leaves the existing session untouched.
    /// Defects are returned, not logged; the callback boundary reports them.
    pub fn insert(&self, session: EnumerationSession) -> Result<()> {
        let id = session.id();
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(DispatchError::Defect(format!(
                "enumeration session {} already exists",
                id
            )));
        }
        sessions.insert(id, Mutex::new(session));
        Ok(())
    }

    pub fn remove(&self, id: &Uuid) -> Result<EnumerationSession> {
        match self.sessions.write().remove(id) {
            Some(session) => Ok(session.into_inner()),
            None => Err(DispatchError::Defect(format!(
                "enumeration session {} does not exist",
                id
            ))),
        }
    }

    /// Run `f` against one session; `None` if the id is unknown.
    pub fn with_session<R>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut EnumerationSession) -> R,
    ) -> Option<R> {
        let sessions = self.sessions.read();
        let session = sessions.get(id)?;
        let mut guard = session.lock();
        Some(f(&mut guard))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
