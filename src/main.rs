//! Брокер Zumq.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{error, info};
use zumq::{
    config::{OverflowPolicy, Provisioning, Settings},
    logging,
    network::{banner, Broker},
};

#[derive(Parser)]
#[command(name = "zumq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Zumq - minimal message broker with at-least-once delivery", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Подробнее логировать (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Запустить брокер
    Server(ServerArgs),
}

/// Флаги перекрывают файл конфигурации и переменные окружения.
#[derive(Args)]
struct ServerArgs {
    /// Адрес прослушивания; ":port" означает все интерфейсы [default: :35254]
    #[arg(short, long)]
    addr: Option<String>,

    /// Окно кредита входящих линков [default: 100]
    #[arg(short, long)]
    credit: Option<u32>,

    /// Ёмкость лениво создаваемых очередей
    #[arg(long)]
    capacity: Option<usize>,

    /// Файл конфигурации (TOML, YAML, JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Отклонять входящие доставки при переполнении очереди
    #[arg(long)]
    reject_on_overflow: bool,

    /// Обслуживать только очереди из конфигурации
    #[arg(long)]
    explicit_queues: bool,
}

impl ServerArgs {
    fn apply(
        &self,
        settings: &mut Settings,
    ) {
        if let Some(addr) = &self.addr {
            settings.listen_address = addr.clone();
        }
        if let Some(credit) = self.credit {
            settings.credit = credit;
        }
        if let Some(capacity) = self.capacity {
            settings.queue_capacity = capacity;
        }
        if self.reject_on_overflow {
            settings.overflow_policy = OverflowPolicy::Reject;
        }
        if self.explicit_queues {
            settings.provisioning = Provisioning::Explicit;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => run_server(args, cli.verbose).await,
    }
}

async fn run_server(
    args: ServerArgs,
    verbose: u8,
) -> Result<()> {
    let mut settings =
        Settings::load_from(args.config.as_deref()).context("failed to load settings")?;
    args.apply(&mut settings);
    settings.logging.raise_verbosity(verbose);

    let logging = logging::init_logging(settings.logging.clone())
        .context("failed to initialize logging")?;

    let broker = Broker::new(settings)?;
    let listener = broker.bind().await?;
    let local = listener
        .local_addr()
        .context("listener has no local address")?
        .to_string();

    banner::print_banner(&local, broker.settings());
    banner::print_startup_log();

    let result = broker
        .serve_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(stats = ?broker.tracker_stats(), "Broker stopped");
    logging.shutdown();
    result
}
