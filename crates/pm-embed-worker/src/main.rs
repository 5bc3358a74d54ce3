use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use pm_common::db::{
    create_pool_from_url, fetch_pending_candidate_items, fetch_pending_choice_items,
    run_migrations, CandidateDimensionSink, ChoiceVectorSink, PgPool,
};
use pm_common::embed::{
    BatchVectorizer, BatchVectorizerConfig, HttpVectorProvider, ProviderConfig, VectorProvider,
};
use pm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use pm_common::run_id;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pm-embed-worker",
    about = "Vectorizes pending quiz choices and candidate profile dimensions"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    db_url: String,

    /// Worker id recorded in the logs
    #[arg(long, default_value = "pm-embed-worker")]
    worker_id: String,

    /// How many pending items to pick up per pass
    #[arg(long, env = "PM_WORKER_BATCH_SIZE", default_value_t = 200)]
    batch_size: i64,

    /// Exit after the first pass that finds nothing pending
    #[arg(long, default_value_t = false)]
    exit_on_empty: bool,

    /// Idle poll interval in milliseconds when running as a long-lived service
    #[arg(long, env = "PM_WORKER_IDLE_POLL_MS", default_value_t = 30000)]
    idle_poll_interval_ms: u64,
}

struct Pass {
    processed: usize,
    cancelled: bool,
}

async fn run_pass(
    pool: &PgPool,
    vectorizer: &BatchVectorizer,
    provider: &dyn VectorProvider,
    batch_size: i64,
    stop: &watch::Receiver<bool>,
) -> Result<Pass, Box<dyn std::error::Error>> {
    let choice_items = fetch_pending_choice_items(pool, batch_size).await?;
    let candidate_items = fetch_pending_candidate_items(pool, batch_size).await?;

    if choice_items.is_empty() && candidate_items.is_empty() {
        return Ok(Pass {
            processed: 0,
            cancelled: false,
        });
    }

    let choice_sink = ChoiceVectorSink::new(pool.clone());
    let choice_report = vectorizer
        .run(provider, &choice_sink, &choice_items, Some(stop))
        .await;

    if choice_report.cancelled {
        return Ok(Pass {
            processed: choice_report.items.len(),
            cancelled: true,
        });
    }

    let candidate_sink = CandidateDimensionSink::new(pool.clone());
    let candidate_report = vectorizer
        .run(provider, &candidate_sink, &candidate_items, Some(stop))
        .await;

    info!(
        choices_ok = choice_report.success_count,
        choices_failed = choice_report.failure_count,
        candidates_ok = candidate_report.success_count,
        candidates_failed = candidate_report.failure_count,
        "vectorization pass finished"
    );

    Ok(Pass {
        processed: choice_report.items.len() + candidate_report.items.len(),
        cancelled: candidate_report.cancelled,
    })
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let args = Cli::parse();
    let pool = create_pool_from_url(&args.db_url)?;
    run_migrations(&pool).await?;

    let provider = HttpVectorProvider::new(ProviderConfig::from_env())?;
    let vectorizer = BatchVectorizer::new(BatchVectorizerConfig::from_env());

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    let status = pool.status();
    info!(
        size = status.size,
        available = status.available,
        worker_id = %args.worker_id,
        run_id = run_id::get(),
        provider = provider.name(),
        batch_size = args.batch_size,
        "created postgres connection pool for embed worker",
    );

    loop {
        if *stop_rx.borrow() {
            info!("stop requested, exiting");
            break;
        }

        let pass = match run_pass(&pool, &vectorizer, &provider, args.batch_size, &stop_rx).await {
            Ok(pass) => pass,
            Err(err) => {
                warn!(error = %err, "vectorization pass failed, will retry after idle interval");
                sleep(Duration::from_millis(args.idle_poll_interval_ms)).await;
                continue;
            }
        };

        if pass.cancelled {
            info!(processed = pass.processed, "pass cancelled mid-run, exiting");
            break;
        }

        if pass.processed == 0 {
            if args.exit_on_empty {
                info!("nothing pending; exiting");
                break;
            }
            sleep(Duration::from_millis(args.idle_poll_interval_ms)).await;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("pm-embed-worker failed: {err}");
        std::process::exit(1);
    }
}
