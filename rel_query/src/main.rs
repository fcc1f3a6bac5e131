mod files;
mod plans;

use std::{io, path::PathBuf, time::Instant};

use argh::FromArgs;
use mpc::{
    executor::{self, MpcExecutionError},
    fields::Mersenne127,
    spdz::{FakeSpdzDealer, SpdzEngine, SpdzError},
    transport::{self, NetworkConfig},
};
use mpc_rel::RelError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use plans::QueryPlan;

/// Field for relational computations.
type Fp = Mersenne127;

/// Error of a query run.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("line {line} of relation file: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error(transparent)]
    Relation(#[from] RelError),
    #[error(transparent)]
    Execution(#[from] MpcExecutionError<SpdzError>),
}

/// Privacy-preserving relational query over private relations of several parties.
#[derive(FromArgs, Debug)]
struct Options {
    /// path to network configuration file
    #[argh(option)]
    config: PathBuf,

    /// current party ID
    #[argh(option)]
    id: usize,

    /// path to private input relation, one row of whitespace-separated integers per line
    #[argh(option)]
    input: Option<PathBuf>,

    /// query plan: aggregate, aggpub, hhi or join
    #[argh(option, default = "QueryPlan::Hhi")]
    query: QueryPlan,

    /// path to write revealed result to, printed to stdout if missing
    #[argh(option)]
    output: Option<PathBuf>,

    /// seed of the insecure dealer, must be the same for all parties
    #[argh(option, default = "0")]
    seed: u8,

    /// comma-separated privacy thresholds of input columns for aggpub, 0 means public
    #[argh(option, default = "String::from(\"0,1\")")]
    thresholds: String,
}

#[tokio::main]
async fn main() -> Result<(), QueryError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options: Options = argh::from_env();
    let party_id = options.id;
    let plan = options.query;
    let thresholds = plans::parse_thresholds(&options.thresholds)?;

    let rows = match &options.input {
        Some(path) => files::read_relation(path)?,
        None => Vec::new(),
    };

    let config = NetworkConfig::load(&options.config)?;
    tracing::info!(party_id, rows = rows.len(), query = %plan, "waiting for peers");

    let connection = transport::connect_multiparty(&config, party_id).await?;
    tracing::info!("all peers connected, running query");

    let start_time = Instant::now();
    let dealer: FakeSpdzDealer<Fp> =
        FakeSpdzDealer::new(config.parties.len(), party_id, options.seed);
    let engine: SpdzEngine<Fp, _, _> = SpdzEngine::new(dealer, connection);

    let (result, stats) = executor::run_circuit(engine, |ctx| {
        Box::pin(plans::run(ctx, plan, rows, thresholds))
    })
    .await?;
    let result = result?;

    tracing::info!(
        time = start_time.elapsed().as_secs_f64(),
        rounds = stats.num_rounds,
        inputs = stats.num_inputs,
        openings = stats.num_openings,
        integrity_checks = stats.num_integrity_checks,
        "query finished"
    );

    match (result, &options.output) {
        (Some(rel), Some(path)) => files::write_relation(path, &rel)?,
        (Some(rel), None) => print!("{}", files::format_relation(&rel)),
        (None, _) => println!("Result wasn't revealed to this party."),
    }
    Ok(())
}
