//! Shared engine handle
//!
//! The catalog and every table it owns form one mutable unit. `SharedEngine`
//! guards it with a single reader-writer lock: SELECTs share the read lock,
//! every other statement holds the write lock until its save completes.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::executor::{ExecutionEngine, QueryResult};
use crate::error::{Error, Result};
use crate::sql::ast::{SelectStatement, Statement};

/// Cloneable, thread-safe handle to one engine
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<ExecutionEngine>>,
}

impl SharedEngine {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Execute a statement, taking the read lock for SELECT
    pub fn execute(&self, stmt: Statement) -> Result<QueryResult> {
        match stmt {
            Statement::Select(select) => self.query(&select),
            other => self.write()?.execute(other),
        }
    }

    /// Run a SELECT under the read lock
    pub fn query(&self, stmt: &SelectStatement) -> Result<QueryResult> {
        self.read()?.query(stmt)
    }

    /// Read access to the engine, e.g. for catalog inspection
    pub fn read(&self) -> Result<RwLockReadGuard<'_, ExecutionEngine>> {
        self.inner
            .read()
            .map_err(|_| Error::Internal("engine lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ExecutionEngine>> {
        self.inner
            .write()
            .map_err(|_| Error::Internal("engine lock poisoned".to_string()))
    }
}

impl From<ExecutionEngine> for SharedEngine {
    fn from(engine: ExecutionEngine) -> Self {
        Self::new(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::*;
    use std::thread;

    #[test]
    fn test_concurrent_inserts_and_reads() {
        let engine = SharedEngine::new(ExecutionEngine::in_memory());
        engine
            .execute(Statement::CreateTable(CreateTableStatement {
                table_name: "counters".to_string(),
                columns: vec![ColumnDef::new("id", "INT").primary_key()],
                constraints: vec![],
            }))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        engine
                            .execute(Statement::Insert(InsertStatement {
                                table_name: "counters".to_string(),
                                columns: None,
                                values: vec![vec![Expr::int(t * 100 + i)]],
                            }))
                            .unwrap();
                        engine.query(&SelectStatement::new("counters")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let result = engine.query(&SelectStatement::new("counters")).unwrap();
        assert_eq!(result.rows.len(), 100);
        assert_eq!(
            engine.read().unwrap().catalog().get_table("counters").unwrap().len(),
            100
        );
    }
}
