use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use memopool::{
    config::{self, Command},
    error::AppError,
    infra::{error::InfraError, telemetry},
    orders::{self, Catalog, OrderService, SimulatedCatalog},
    pool::WorkerPool,
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command_or_default();

    telemetry::init(&settings.logging)?;

    let catalog: Arc<dyn Catalog> = Arc::new(SimulatedCatalog::generate(
        &settings.catalog,
        settings.batch.seed,
    ));
    let pool = WorkerPool::new(&settings.pool)?;
    let make_service = || {
        OrderService::new(
            Arc::clone(&catalog),
            &settings.cache,
            settings.catalog.order_latency,
        )
    };
    let batch = orders::generate_orders(&settings.batch);

    info!(
        command = command_name(&command),
        orders = batch.len(),
        workers = pool.size().get(),
        single_flight = settings.cache.single_flight,
        "Starting run"
    );

    let json = command.run_args().json;
    let outcome = match command {
        Command::Compare(_) => {
            let comparison = orders::compare(&pool, make_service, &batch)?;
            emit(&comparison, json)
        }
        Command::Serial(_) => {
            let report = orders::run_serial(&make_service(), batch);
            emit(&report, json)
        }
        Command::Parallel(_) => {
            let report = orders::run_parallel(&pool, &Arc::new(make_service()), batch)?;
            emit(&report, json)
        }
    };

    pool.shutdown();
    info!("Run finished");
    outcome
}

fn emit<R>(report: &R, json: bool) -> Result<(), AppError>
where
    R: Serialize + std::fmt::Display,
{
    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, report).map_err(InfraError::from)?;
        writeln!(stdout).map_err(InfraError::from)?;
    } else {
        write!(stdout, "{report}").map_err(InfraError::from)?;
    }
    stdout.flush().map_err(InfraError::from)?;
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Compare(_) => "compare",
        Command::Serial(_) => "serial",
        Command::Parallel(_) => "parallel",
    }
}
