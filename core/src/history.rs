//! SQLite cycle history.
//!
//! RULE: Only history.rs talks to the database.
//! One row is appended per tracking key per completed cycle. The log is
//! advisory: callers log write failures and carry on.

use crate::{
    clock::CycleContext,
    cycle::NodeReport,
    error::AcctResult,
    types::NODE_TOTAL_KEY,
};
use rusqlite::{params, Connection};

#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRow {
    pub id:           Option<i64>,
    pub stream:       String,
    pub node:         String,
    pub tracking_key: String,
    pub recorded_at:  String, // RFC 3339
    pub day_of_month: f64,
    pub used_current: Option<f64>,
    pub used_month:   Option<f64>,
    pub used_growth:  Option<f64>,
    pub used_average: Option<f64>,
    pub payout:       Option<f64>,
    pub payout_month: Option<f64>,
}

pub struct CycleLog {
    conn: Connection,
}

impl CycleLog {
    pub fn open(path: &str) -> AcctResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: report readers do not block the writer.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AcctResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AcctResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_cycle_log.sql"))?;
        Ok(())
    }

    /// Append the node total and every satellite of one node report in a single transaction.
    pub fn append_report(
        &mut self,
        stream: &str,
        ctx: &CycleContext,
        report: &NodeReport,
    ) -> AcctResult<usize> {
        let recorded_at = ctx.timestamp.to_rfc3339();
        let base = |key: &str| EstimateRow {
            id:           None,
            stream:       stream.to_string(),
            node:         report.node.clone(),
            tracking_key: key.to_string(),
            recorded_at:  recorded_at.clone(),
            day_of_month: ctx.day_of_month,
            used_current: None,
            used_month:   None,
            used_growth:  None,
            used_average: None,
            payout:       None,
            payout_month: None,
        };

        let mut rows = Vec::with_capacity(report.satellites.len() + 1);
        let mut total = base(NODE_TOTAL_KEY);
        total.used_current = report.usage.as_ref().map(|u| u.used_current);
        total.used_month = Some(report.reconciled.used_month);
        total.used_growth = report.usage.as_ref().map(|u| u.used_growth);
        total.used_average = report.usage.as_ref().map(|u| u.used_average);
        total.payout = report.payout.as_ref().map(|p| p.payout);
        total.payout_month = Some(report.reconciled.payout_month);
        rows.push(total);

        for sat in &report.satellites {
            let mut row = base(&sat.satellite);
            row.used_current = sat.usage.as_ref().map(|u| u.used_current);
            row.used_month = sat.usage.as_ref().map(|u| u.used_month);
            row.used_growth = sat.usage.as_ref().map(|u| u.used_growth);
            row.used_average = sat.usage.as_ref().map(|u| u.used_average);
            row.payout = Some(sat.payout.payout);
            row.payout_month = Some(sat.payout.payout_month);
            rows.push(row);
        }

        let tx = self.conn.transaction()?;
        for row in &rows {
            insert_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn estimates_for_node(&self, stream: &str, node: &str) -> AcctResult<Vec<EstimateRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stream, node, tracking_key, recorded_at, day_of_month,
                    used_current, used_month, used_growth, used_average, payout, payout_month
             FROM cycle_estimate WHERE stream = ?1 AND node = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![stream, node], |row| {
                Ok(EstimateRow {
                    id:           Some(row.get(0)?),
                    stream:       row.get(1)?,
                    node:         row.get(2)?,
                    tracking_key: row.get(3)?,
                    recorded_at:  row.get(4)?,
                    day_of_month: row.get(5)?,
                    used_current: row.get(6)?,
                    used_month:   row.get(7)?,
                    used_growth:  row.get(8)?,
                    used_average: row.get(9)?,
                    payout:       row.get(10)?,
                    payout_month: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn estimate_count(&self, stream: &str) -> AcctResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM cycle_estimate WHERE stream = ?1",
            params![stream],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn insert_row(conn: &Connection, row: &EstimateRow) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO cycle_estimate
         (stream, node, tracking_key, recorded_at, day_of_month,
          used_current, used_month, used_growth, used_average, payout, payout_month)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.stream,
            row.node,
            row.tracking_key,
            row.recorded_at,
            row.day_of_month,
            row.used_current,
            row.used_month,
            row.used_growth,
            row.used_average,
            row.payout,
            row.payout_month,
        ],
    )
}
