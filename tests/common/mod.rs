//! In-memory mock driver shared by integration tests.
//!
//! Expectations are consumed in order: every prepare must match the next
//! expected SQL text exactly. All driver calls are recorded as events.

#![allow(dead_code)]

use sqltool_rs::{Connection, Error, ExecResult, QueryResult, Result, Statement, Transaction, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Prepare { sql: String, in_tx: bool },
    Exec(Vec<Value>),
    Query(Vec<Value>),
    Close,
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
enum Response {
    Exec(ExecResult),
    Rows(QueryResult),
    ExecError(String),
    PrepareError(String),
    Hang,
}

#[derive(Debug, Default)]
struct State {
    expectations: VecDeque<(String, Response)>,
    events: Vec<Event>,
    fail_begin: Option<String>,
    fail_commit: Option<String>,
    fail_rollback: Option<String>,
}

/// Mock base connection.
#[derive(Debug, Clone, Default)]
pub struct MockDb {
    state: Arc<Mutex<State>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, sql: &str, response: Response) {
        self.state
            .lock()
            .unwrap()
            .expectations
            .push_back((sql.to_string(), response));
    }

    pub fn expect_exec(&self, sql: &str, rows_affected: u64) {
        self.push(
            sql,
            Response::Exec(ExecResult {
                rows_affected,
                last_insert_id: None,
            }),
        );
    }

    pub fn expect_query(&self, sql: &str, result: QueryResult) {
        self.push(sql, Response::Rows(result));
    }

    pub fn expect_exec_error(&self, sql: &str, message: &str) {
        self.push(sql, Response::ExecError(message.to_string()));
    }

    pub fn expect_prepare_error(&self, sql: &str, message: &str) {
        self.push(sql, Response::PrepareError(message.to_string()));
    }

    pub fn expect_hang(&self, sql: &str) {
        self.push(sql, Response::Hang);
    }

    pub fn fail_begin(&self, message: &str) {
        self.state.lock().unwrap().fail_begin = Some(message.to_string());
    }

    pub fn fail_commit(&self, message: &str) {
        self.state.lock().unwrap().fail_commit = Some(message.to_string());
    }

    pub fn fail_rollback(&self, message: &str) {
        self.state.lock().unwrap().fail_rollback = Some(message.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Bound arguments of every exec/query, in order.
    pub fn args(&self) -> Vec<Vec<Value>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Exec(args) | Event::Query(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn prepares(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Prepare { .. }))
            .count()
    }

    /// Check that every expectation was consumed.
    pub fn all_consumed(&self) -> bool {
        self.state.lock().unwrap().expectations.is_empty()
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    fn prepare_inner(&self, sql: &str, in_tx: bool) -> Result<MockStatement> {
        self.record(Event::Prepare {
            sql: sql.to_string(),
            in_tx,
        });
        let next = self.state.lock().unwrap().expectations.pop_front();
        match next {
            Some((expected, _)) if expected != sql => Err(Error::driver(format!(
                "unexpected statement: expected {:?}, got {:?}",
                expected, sql
            ))),
            Some((_, Response::PrepareError(message))) => Err(Error::driver(message)),
            Some((_, response)) => Ok(MockStatement {
                db: self.clone(),
                response,
            }),
            None => Err(Error::driver(format!("no statement expected, got {:?}", sql))),
        }
    }
}

/// Mock prepared statement.
#[derive(Debug)]
pub struct MockStatement {
    db: MockDb,
    response: Response,
}

impl MockStatement {
    async fn respond(&self) -> Result<Response> {
        match &self.response {
            Response::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(Error::driver("hang finished"))
            }
            Response::ExecError(message) => Err(Error::driver(message.clone())),
            other => Ok(other.clone()),
        }
    }
}

impl Statement for MockStatement {
    async fn execute(&mut self, args: &[Value]) -> Result<ExecResult> {
        self.db.record(Event::Exec(args.to_vec()));
        match self.respond().await? {
            Response::Exec(result) => Ok(result),
            other => Err(Error::driver(format!("exec against {:?}", other))),
        }
    }

    async fn query(&mut self, args: &[Value]) -> Result<QueryResult> {
        self.db.record(Event::Query(args.to_vec()));
        match self.respond().await? {
            Response::Rows(result) => Ok(result),
            other => Err(Error::driver(format!("query against {:?}", other))),
        }
    }

    async fn close(self) -> Result<()> {
        self.db.record(Event::Close);
        Ok(())
    }
}

/// Mock transaction.
#[derive(Debug)]
pub struct MockTx {
    db: MockDb,
}

impl Transaction for MockTx {
    type Statement = MockStatement;

    async fn prepare(&mut self, sql: &str) -> Result<MockStatement> {
        self.db.prepare_inner(sql, true)
    }

    async fn commit(self) -> Result<()> {
        self.db.record(Event::Commit);
        match self.db.state.lock().unwrap().fail_commit.clone() {
            Some(message) => Err(Error::driver(message)),
            None => Ok(()),
        }
    }

    async fn rollback(self) -> Result<()> {
        self.db.record(Event::Rollback);
        match self.db.state.lock().unwrap().fail_rollback.clone() {
            Some(message) => Err(Error::driver(message)),
            None => Ok(()),
        }
    }
}

impl Connection for MockDb {
    type Statement = MockStatement;
    type Transaction = MockTx;

    async fn prepare(&self, sql: &str) -> Result<MockStatement> {
        self.prepare_inner(sql, false)
    }

    async fn begin(&self) -> Result<MockTx> {
        let failure = self.state.lock().unwrap().fail_begin.clone();
        if let Some(message) = failure {
            return Err(Error::driver(message));
        }
        self.record(Event::Begin);
        Ok(MockTx { db: self.clone() })
    }
}
