use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hearth_core::{
    Category, Contribution, ContributionId, Expense, ExpenseId, MemberAggregate, MemberId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::warn;

use crate::store::{LedgerStore, StoreTransaction, WriteGrant};
use crate::{ContributionQuery, ExpenseQuery, LedgerError, LedgerResult};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    namespace TEXT NOT NULL,
    member_id TEXT NOT NULL,
    name TEXT NOT NULL,
    total_deposited TEXT NOT NULL DEFAULT '0',
    total_paid TEXT NOT NULL DEFAULT '0',
    total_gym_deposited TEXT NOT NULL DEFAULT '0',
    total_gym_paid TEXT NOT NULL DEFAULT '0',
    PRIMARY KEY (namespace, member_id)
);
CREATE TABLE IF NOT EXISTS expenses (
    namespace TEXT NOT NULL,
    expense_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    category TEXT NOT NULL,
    cost TEXT NOT NULL,
    date TEXT NOT NULL,
    buyer_id TEXT NOT NULL,
    shared_with TEXT NOT NULL,
    split_amount TEXT,
    is_gym_expense INTEGER NOT NULL,
    PRIMARY KEY (namespace, expense_id)
);
CREATE INDEX IF NOT EXISTS expenses_idx_namespace_gym_date
    ON expenses(namespace, is_gym_expense, date);
CREATE TABLE IF NOT EXISTS contributions (
    namespace TEXT NOT NULL,
    contribution_id TEXT NOT NULL,
    member_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    tags TEXT NOT NULL,
    PRIMARY KEY (namespace, contribution_id)
);
CREATE INDEX IF NOT EXISTS contributions_idx_namespace_member_date
    ON contributions(namespace, member_id, date);
"#;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store; collections are scoped by `namespace`.
#[derive(Clone, Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
    namespace: String,
    busy_timeout: Duration,
}

impl SqliteLedgerStore {
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>) -> LedgerResult<Self> {
        let store = Self {
            path: path.into(),
            namespace: namespace.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// How long writers wait on a locked database before giving up.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn member(&self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>> {
        let conn = self.connect()?;
        load_member(&conn, &self.namespace, id)
    }

    fn members(&self) -> LedgerResult<Vec<MemberAggregate>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT member_id, name, total_deposited, total_paid, total_gym_deposited, total_gym_paid
             FROM members WHERE namespace = ?1 ORDER BY member_id ASC",
        )?;
        let mut rows = stmt.query(params![self.namespace])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(row_to_member(row)?);
        }
        Ok(members)
    }

    fn expense(&self, id: &ExpenseId) -> LedgerResult<Option<Expense>> {
        let conn = self.connect()?;
        load_expense(&conn, &self.namespace, id)
    }

    fn expenses(&self, query: &ExpenseQuery) -> LedgerResult<Vec<Expense>> {
        let conn = self.connect()?;
        let mut sql = String::from(
            "SELECT expense_id, item_name, category, cost, date, buyer_id, shared_with, split_amount, is_gym_expense
             FROM expenses
             WHERE namespace = ?1
               AND (?2 = 0 OR is_gym_expense = 1)
               AND (?3 IS NULL OR buyer_id = ?3
                    OR EXISTS (SELECT 1 FROM json_each(expenses.shared_with) WHERE json_each.value = ?3))
               AND (?4 IS NULL OR date >= ?4)
               AND (?5 IS NULL OR date <= ?5)
             ORDER BY date DESC, rowid DESC",
        );
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?6");
        }

        let mut params: Vec<Value> = Vec::with_capacity(6);
        params.push(Value::from(self.namespace.clone()));
        params.push(Value::Integer(i64::from(query.gym_only)));
        params.push(optional_text(query.member.as_ref().map(|id| id.to_string())));
        params.push(optional_text(query.start_date.map(format_date)));
        params.push(optional_text(query.end_date.map(format_date)));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut expenses = Vec::new();
        while let Some(row) = rows.next()? {
            expenses.push(row_to_expense(row)?);
        }
        Ok(expenses)
    }

    fn contributions(&self, query: &ContributionQuery) -> LedgerResult<Vec<Contribution>> {
        let conn = self.connect()?;
        let mut sql = String::from(
            "SELECT contribution_id, member_id, amount, date, description, tags
             FROM contributions
             WHERE namespace = ?1
               AND (?2 IS NULL OR member_id = ?2)
               AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM json_each(contributions.tags)
                    WHERE lower(json_each.value) = lower(?3)))
               AND (?4 IS NULL OR date >= ?4)
               AND (?5 IS NULL OR date <= ?5)
             ORDER BY date ASC, rowid ASC",
        );
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?6");
        }

        let mut params: Vec<Value> = Vec::with_capacity(6);
        params.push(Value::from(self.namespace.clone()));
        params.push(optional_text(query.member.as_ref().map(|id| id.to_string())));
        params.push(optional_text(query.tag.clone()));
        params.push(optional_text(query.start_time.map(format_timestamp)));
        params.push(optional_text(query.end_time.map(format_timestamp)));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_contribution(row)?);
        }
        Ok(entries)
    }

    fn begin(&self, _grant: WriteGrant) -> LedgerResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            namespace: &self.namespace,
            finished: false,
        }))
    }
}

/// Owns a dedicated connection with an open `BEGIN IMMEDIATE` transaction.
struct SqliteTransaction<'a> {
    conn: Connection,
    namespace: &'a str,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn member(&mut self, id: &MemberId) -> LedgerResult<Option<MemberAggregate>> {
        load_member(&self.conn, self.namespace, id)
    }

    fn put_member(&mut self, member: &MemberAggregate) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO members (
                namespace, member_id, name, total_deposited, total_paid, total_gym_deposited, total_gym_paid
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(namespace, member_id) DO UPDATE SET
                name = excluded.name,
                total_deposited = excluded.total_deposited,
                total_paid = excluded.total_paid,
                total_gym_deposited = excluded.total_gym_deposited,
                total_gym_paid = excluded.total_gym_paid",
            params![
                self.namespace,
                member.id.as_str(),
                member.name,
                member.total_deposited.to_string(),
                member.total_paid.to_string(),
                member.total_gym_deposited.to_string(),
                member.total_gym_paid.to_string(),
            ],
        )?;
        Ok(())
    }

    fn expense(&mut self, id: &ExpenseId) -> LedgerResult<Option<Expense>> {
        load_expense(&self.conn, self.namespace, id)
    }

    fn put_expense(&mut self, expense: &Expense) -> LedgerResult<()> {
        let shared_with = serde_json::to_string(&expense.shared_with)?;
        self.conn.execute(
            "INSERT INTO expenses (
                namespace, expense_id, item_name, category, cost, date, buyer_id, shared_with,
                split_amount, is_gym_expense
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(namespace, expense_id) DO UPDATE SET
                item_name = excluded.item_name,
                category = excluded.category,
                cost = excluded.cost,
                date = excluded.date,
                buyer_id = excluded.buyer_id,
                shared_with = excluded.shared_with,
                split_amount = excluded.split_amount,
                is_gym_expense = excluded.is_gym_expense",
            params![
                self.namespace,
                expense.id.to_string(),
                expense.item_name,
                expense.category.as_str(),
                expense.cost.to_string(),
                format_date(expense.date),
                expense.buyer.as_str(),
                shared_with,
                expense.split_amount.map(|split| split.to_string()),
                expense.is_gym_expense,
            ],
        )?;
        Ok(())
    }

    fn delete_expense(&mut self, id: &ExpenseId) -> LedgerResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM expenses WHERE namespace = ?1 AND expense_id = ?2",
            params![self.namespace, id.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn append_contribution(&mut self, contribution: &Contribution) -> LedgerResult<()> {
        let tags = serde_json::to_string(&contribution.tags)?;
        self.conn.execute(
            "INSERT INTO contributions (
                namespace, contribution_id, member_id, amount, date, description, tags
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.namespace,
                contribution.id.to_string(),
                contribution.member.as_str(),
                contribution.amount.to_string(),
                format_timestamp(contribution.date),
                contribution.description,
                tags,
            ],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> LedgerResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "failed to roll back ledger transaction");
            }
        }
    }
}

fn load_member(
    conn: &Connection,
    namespace: &str,
    id: &MemberId,
) -> LedgerResult<Option<MemberAggregate>> {
    let mut stmt = conn.prepare(
        "SELECT member_id, name, total_deposited, total_paid, total_gym_deposited, total_gym_paid
         FROM members WHERE namespace = ?1 AND member_id = ?2",
    )?;
    let mut rows = stmt.query(params![namespace, id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_member(row)?)),
        None => Ok(None),
    }
}

fn load_expense(
    conn: &Connection,
    namespace: &str,
    id: &ExpenseId,
) -> LedgerResult<Option<Expense>> {
    let row = conn
        .query_row(
            "SELECT expense_id, item_name, category, cost, date, buyer_id, shared_with, split_amount, is_gym_expense
             FROM expenses WHERE namespace = ?1 AND expense_id = ?2",
            params![namespace, id.to_string()],
            |row| {
                Ok(RawExpense {
                    id: row.get(0)?,
                    item_name: row.get(1)?,
                    category: row.get(2)?,
                    cost: row.get(3)?,
                    date: row.get(4)?,
                    buyer: row.get(5)?,
                    shared_with: row.get(6)?,
                    split_amount: row.get(7)?,
                    is_gym_expense: row.get(8)?,
                })
            },
        )
        .optional()?;
    row.map(RawExpense::decode).transpose()
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_decimal(column: &str, raw: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|err| LedgerError::Serialization(format!("invalid {column} {raw}: {err}")))
}

fn row_to_member(row: &rusqlite::Row<'_>) -> LedgerResult<MemberAggregate> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let deposited: String = row.get(2)?;
    let paid: String = row.get(3)?;
    let gym_deposited: String = row.get(4)?;
    let gym_paid: String = row.get(5)?;
    Ok(MemberAggregate {
        id: MemberId::new(id),
        name,
        total_deposited: parse_decimal("total_deposited", &deposited)?,
        total_paid: parse_decimal("total_paid", &paid)?,
        total_gym_deposited: parse_decimal("total_gym_deposited", &gym_deposited)?,
        total_gym_paid: parse_decimal("total_gym_paid", &gym_paid)?,
    })
}

struct RawExpense {
    id: String,
    item_name: String,
    category: String,
    cost: String,
    date: String,
    buyer: String,
    shared_with: String,
    split_amount: Option<String>,
    is_gym_expense: bool,
}

impl RawExpense {
    fn decode(self) -> LedgerResult<Expense> {
        let id = ExpenseId::from_str(&self.id).map_err(|err| {
            LedgerError::Serialization(format!("invalid expense id {}: {err}", self.id))
        })?;
        let category = Category::from_str(&self.category).map_err(|err| {
            LedgerError::Serialization(format!("invalid category {}: {err}", self.category))
        })?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|err| {
            LedgerError::Serialization(format!("invalid expense date {}: {err}", self.date))
        })?;
        let shared_with: Vec<MemberId> = serde_json::from_str(&self.shared_with)?;
        // Legacy rows may carry an empty or garbled split; treat it as absent.
        let split_amount = match self.split_amount {
            Some(raw) => match Decimal::from_str(raw.trim()) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(expense = %id, raw = %raw, error = %err, "unreadable split amount");
                    None
                }
            },
            None => None,
        };
        Ok(Expense {
            id,
            item_name: self.item_name,
            category,
            cost: parse_decimal("cost", &self.cost)?,
            date,
            buyer: MemberId::new(self.buyer),
            shared_with,
            split_amount,
            is_gym_expense: self.is_gym_expense,
        })
    }
}

fn row_to_expense(row: &rusqlite::Row<'_>) -> LedgerResult<Expense> {
    RawExpense {
        id: row.get(0)?,
        item_name: row.get(1)?,
        category: row.get(2)?,
        cost: row.get(3)?,
        date: row.get(4)?,
        buyer: row.get(5)?,
        shared_with: row.get(6)?,
        split_amount: row.get(7)?,
        is_gym_expense: row.get(8)?,
    }
    .decode()
}

fn row_to_contribution(row: &rusqlite::Row<'_>) -> LedgerResult<Contribution> {
    let id: String = row.get(0)?;
    let member: String = row.get(1)?;
    let amount: String = row.get(2)?;
    let date: String = row.get(3)?;
    let description: String = row.get(4)?;
    let tags: String = row.get(5)?;

    let date = DateTime::parse_from_rfc3339(&date)
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {date}: {err}")))?
        .with_timezone(&Utc);
    Ok(Contribution {
        id: ContributionId::from_str(&id).map_err(|err| {
            LedgerError::Serialization(format!("invalid contribution id {id}: {err}"))
        })?,
        member: MemberId::new(member),
        amount: parse_decimal("amount", &amount)?,
        date,
        description,
        tags: serde_json::from_str(&tags)?,
    })
}
