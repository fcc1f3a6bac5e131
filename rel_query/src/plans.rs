use std::{fmt, str::FromStr};

use mpc::{executor::MpcExecutionContext, MpcContext, MpcEngine};
use mpc_rel::{divide, Cell, KeyMode, OutputHandle, PlainRelation, QuerySession, RelError};

use crate::QueryError;

/// Number of quotient bits when computing market shares.
const DIVISION_PRECISION: usize = 12;

/// Query plans available from command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryPlan {
    /// Sum of values per secret key.
    Aggregate,
    /// Sum of values per public key, with sums revealed afterwards.
    AggregatePublic,
    /// Herfindahl-Hirschman index of (company, revenue) rows.
    Hhi,
    /// Join of rows of party 0 with rows of all other parties.
    Join,
}

impl FromStr for QueryPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggregate" => Ok(QueryPlan::Aggregate),
            "aggpub" => Ok(QueryPlan::AggregatePublic),
            "hhi" => Ok(QueryPlan::Hhi),
            "join" => Ok(QueryPlan::Join),
            _ => Err(format!("unknown query plan {:?}", s)),
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryPlan::Aggregate => "aggregate",
            QueryPlan::AggregatePublic => "aggpub",
            QueryPlan::Hhi => "hhi",
            QueryPlan::Join => "join",
        };
        f.write_str(name)
    }
}

/// Parse comma-separated list of column thresholds.
pub fn parse_thresholds(raw: &str) -> Result<Vec<usize>, QueryError> {
    raw.split(',')
        .map(|x| {
            x.trim()
                .parse()
                .map_err(|_| QueryError::InvalidThresholds(raw.to_owned()))
        })
        .collect()
}

/// Run query plan on private rows of current party.
/// Returns None if the result wasn't revealed to current party.
pub async fn run<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    plan: QueryPlan,
    rows: PlainRelation,
    thresholds: Vec<usize>,
) -> Result<Option<PlainRelation>, RelError> {
    let mut session = QuerySession::new(ctx);
    let output = match plan {
        QueryPlan::Aggregate => aggregate(&mut session, rows)?,
        QueryPlan::AggregatePublic => aggregate_public(&mut session, rows, thresholds)?,
        QueryPlan::Hhi => hhi(&mut session, rows)?,
        QueryPlan::Join => join(&mut session, rows)?,
    };
    Ok(session.finish().await?.take(output))
}

fn aggregate<E: MpcEngine>(
    session: &mut QuerySession<'_, E>,
    rows: PlainRelation,
) -> Result<OutputHandle, RelError> {
    let rel = session.input(rows, 2)?;
    let sums = session.aggregate_sum(rel, 0, 1, KeyMode::Private)?;
    session.output(sums)
}

/// Keys are shared with threshold 0, so groups are formed locally and only sums need reveal.
fn aggregate_public<E: MpcEngine>(
    session: &mut QuerySession<'_, E>,
    rows: PlainRelation,
    thresholds: Vec<usize>,
) -> Result<OutputHandle, RelError> {
    let rel = session.scatter(rows, thresholds)?;
    let sums = session.aggregate_sum(rel, 0, 1, KeyMode::Open)?;
    let everyone = (0..session.context().num_parties()).collect();
    let revealed = session.gather(sums, vec![1], everyone)?;
    session.output(revealed)
}

/// Market concentration: sum of squared market shares (in percent) of companies with
/// positive revenue. Only the index and the number of companies are revealed.
fn hhi<E: MpcEngine>(
    session: &mut QuerySession<'_, E>,
    rows: PlainRelation,
) -> Result<OutputHandle, RelError> {
    let revenues = session.input(rows, 2)?;
    let company_revenue = session.aggregate_sum(revenues, 0, 1, KeyMode::Private)?;
    let anonymous = session.project(company_revenue, 2, |_, row| {
        vec![row[0].scale(0), row[1]]
    })?;
    let active = session.select(anonymous, |ctx, row| async move {
        Ok::<_, RelError>(row[1].greater(ctx, Cell::Plain(0)).await)
    })?;

    let total_revenue = session.aggregate_sum(active, 0, 1, KeyMode::Private)?;
    let scaled = session.project(active, 2, |_, row| vec![row[0], row[1].scale(100)])?;
    let with_total = session.join(scaled, total_revenue, 0, 0, KeyMode::Private)?;

    let market_share = session.project_with(with_total, 3, |ctx, row| async move {
        let share = divide(ctx, row[1], row[2], DIVISION_PRECISION).await?;
        Ok::<_, RelError>(vec![row[0], share, row[2]])
    })?;
    let squared = session.project_with(market_share, 3, |ctx, row| async move {
        let square = row[1].mul(ctx, row[1]).await;
        Ok::<_, RelError>(vec![row[0], square, row[2]])
    })?;

    let index = session.aggregate_sum(squared, 0, 1, KeyMode::Private)?;
    session.output(index)
}

/// Rows of party 0 joined with rows of everyone else on the first column.
fn join<E: MpcEngine>(
    session: &mut QuerySession<'_, E>,
    rows: PlainRelation,
) -> Result<OutputHandle, RelError> {
    let (left_rows, right_rows) = if session.context().party_id() == 0 {
        (rows, Vec::new())
    } else {
        (Vec::new(), rows)
    };
    let left = session.input(left_rows, 2)?;
    let right = session.input(right_rows, 2)?;
    let joined = session.join(left, right, 0, 0, KeyMode::Private)?;
    session.output(joined)
}
