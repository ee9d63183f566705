use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payflow::application::batch::BatchOrchestrator;
use payflow::application::events::{EventBus, GroupSyncListener};
use payflow::application::jobs::{JobContext, JobRunner};
use payflow::application::payouts::PayoutService;
use payflow::application::schedule::Scheduler;
use payflow::application::worker::Worker;
use payflow::config::Settings;
use payflow::domain::money::Balance;
use payflow::domain::order::UserId;
use payflow::domain::payout::{CommissionId, SellerId};
use payflow::domain::ports::{CommissionStore, PayoutStoreRef};
use payflow::infrastructure::http::ReqwestTransport;
use payflow::infrastructure::in_memory::{
    InMemoryCatalogStore, InMemoryCommissionStore, InMemoryFraudScreen, InMemoryJobQueue,
    InMemoryOrderStore, InMemoryPayoutStore, InMemoryReservationStore, InMemoryUserStore,
    InMemoryWebhookLogStore, InMemoryWebhookStore, RecordingGroupSynchronizer,
};
use payflow::infrastructure::sandbox::SandboxProcessor;
use payflow::interfaces::csv::commission_reader::CommissionReader;
use payflow::interfaces::csv::payout_writer::PayoutWriter;
use payflow::telemetry;
use payflow::webhooks::caller::WebhookCaller;
use payflow::webhooks::dispatcher::WebhookDispatcher;
use payflow::webhooks::recorder::WebhookLogRecorder;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pays sellers their unpaid commissions and prints the resulting payouts.
    Payouts {
        /// Input commissions CSV file (commission, order, seller, amount)
        input: PathBuf,

        /// Funds available on the sandbox processor's platform account
        #[arg(long, default_value = "0")]
        platform_balance: Decimal,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Dispatches group re-syncs for users 1..=N in chunked batches and runs them.
    SyncGroups {
        #[arg(long)]
        users: u64,

        /// Overrides PAYFLOW_GROUP_SYNC_CHUNK_SIZE
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Runs the housekeeping schedule and a job worker until interrupted.
    Work,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let settings = Settings::from_env().into_diagnostic()?;

    match cli.command {
        Command::Payouts {
            input,
            platform_balance,
            db_path,
        } => payouts(&settings, input, platform_balance, db_path).await,
        Command::SyncGroups { users, chunk_size } => {
            sync_groups(&settings, users, chunk_size).await
        }
        Command::Work => work(&settings).await,
    }
}

fn payout_store(db_path: Option<PathBuf>) -> Result<PayoutStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = payflow::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryPayoutStore::new()))
        }
        None => Ok(Arc::new(InMemoryPayoutStore::new())),
    }
}

async fn payouts(
    settings: &Settings,
    input: PathBuf,
    platform_balance: Decimal,
    db_path: Option<PathBuf>,
) -> Result<()> {
    let processor = Arc::new(SandboxProcessor::new(Balance::new(platform_balance)));
    let payouts = payout_store(db_path)?;
    let commissions = InMemoryCommissionStore::new();
    let service = PayoutService::new(
        processor,
        payouts.clone(),
        Arc::new(commissions.clone()),
        Arc::new(EventBus::new()),
    )
    .with_claim_ttl(settings.payout_claim_ttl);

    let file = File::open(input).into_diagnostic()?;
    let mut by_seller: BTreeMap<SellerId, Vec<CommissionId>> = BTreeMap::new();
    for result in CommissionReader::new(file).commissions() {
        match result {
            Ok(commission) => {
                by_seller
                    .entry(commission.seller_id)
                    .or_default()
                    .push(commission.id);
                commissions.store(commission).await.into_diagnostic()?;
            }
            Err(e) => tracing::error!(error = %e, "skipping unreadable commission row"),
        }
    }

    for (seller_id, ids) in by_seller {
        if let Err(e) = service.create(seller_id, &ids, None).await {
            tracing::error!(seller_id, error = %e, "could not create payout");
        }
    }

    let summary = service.process_pending().await.into_diagnostic()?;
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "payout sweep finished"
    );

    let stdout = io::stdout();
    let mut writer = PayoutWriter::new(stdout.lock());
    writer
        .write_payouts(payouts.all().await.into_diagnostic()?)
        .into_diagnostic()?;
    Ok(())
}

/// Wires a job runner over in-memory adapters and the sandbox processor, with
/// group sync and webhook dispatch listening on the event bus.
fn job_runner(
    settings: &Settings,
    queue: &InMemoryJobQueue,
    groups: &RecordingGroupSynchronizer,
) -> JobRunner {
    let logs = Arc::new(InMemoryWebhookLogStore::new());
    let dispatcher = WebhookDispatcher::new(
        Arc::new(InMemoryWebhookStore::new()),
        logs.clone(),
        Arc::new(queue.clone()),
    )
    .on_queue(settings.webhook_queue.clone());
    let events = EventBus::new()
        .with_listener(Arc::new(GroupSyncListener::new(Arc::new(queue.clone()))))
        .with_listener(Arc::new(dispatcher));
    let transport = Arc::new(ReqwestTransport::new(settings.webhook_timeout));

    JobRunner::new(JobContext {
        gateway: Arc::new(SandboxProcessor::new(Balance::ZERO)),
        users: Arc::new(InMemoryUserStore::new()),
        catalog: Arc::new(InMemoryCatalogStore::new()),
        orders: Arc::new(InMemoryOrderStore::new()),
        reservations: Arc::new(InMemoryReservationStore::new()),
        groups: Arc::new(groups.clone()),
        fraud: Arc::new(InMemoryFraudScreen::new()),
        events: Arc::new(events),
        webhook_caller: Arc::new(WebhookCaller::new(
            transport,
            settings.webhook_tries,
            settings.webhook_backoff,
        )),
        webhook_recorder: Arc::new(WebhookLogRecorder::new(logs)),
        pending_order_ttl: settings.pending_order_ttl,
        inactive_user_ttl: settings.inactive_user_ttl,
    })
}

async fn sync_groups(settings: &Settings, users: u64, chunk_size: Option<usize>) -> Result<()> {
    let queue = InMemoryJobQueue::new();
    let orchestrator = BatchOrchestrator::new(Arc::new(queue.clone()))
        .with_chunk_size(chunk_size.unwrap_or(settings.group_sync_chunk_size));
    let user_ids: Vec<UserId> = (1..=users).collect();
    let handles = orchestrator.sync_groups(&user_ids).await.into_diagnostic()?;

    let groups = RecordingGroupSynchronizer::new();
    let runner = job_runner(settings, &queue, &groups);
    let report = Worker::new(Arc::new(queue), Arc::new(runner))
        .run_until_idle()
        .await;
    tracing::info!(
        synced = groups.synced().await.len(),
        failed = report.failed,
        "group sync finished"
    );

    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    writer.write_record(["batch", "name", "jobs"]).into_diagnostic()?;
    for handle in handles {
        writer
            .write_record([
                handle.id.to_string(),
                handle.name,
                handle.total_jobs.to_string(),
            ])
            .into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;
    Ok(())
}

async fn work(settings: &Settings) -> Result<()> {
    let queue = InMemoryJobQueue::new();
    let groups = RecordingGroupSynchronizer::new();
    let worker = Worker::new(
        Arc::new(queue.clone()),
        Arc::new(job_runner(settings, &queue, &groups)),
    );
    let scheduler = Scheduler::new(Arc::new(queue), Utc::now());
    let shutdown = CancellationToken::new();

    let scheduling = tokio::spawn(scheduler.run(shutdown.clone()));
    let working = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    tracing::info!("shutting down");
    shutdown.cancel();

    scheduling.await.into_diagnostic()?.into_diagnostic()?;
    let report = working.await.into_diagnostic()?;
    tracing::info!(jobs = report.total(), failed = report.failed, "worker drained");
    Ok(())
}
