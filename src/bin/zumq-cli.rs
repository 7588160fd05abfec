//! CLI клиент Zumq.
//!
//! Публикует сообщения в адрес и получает их оттуда по построчному
//! протоколу брокера.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use zumq::{
    client::{ClientConfig, Consumer, Producer},
    Outcome,
};

#[derive(Parser)]
#[command(name = "zumq-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Zumq CLI - send and receive messages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Адрес брокера
    #[arg(short, long, default_value = "127.0.0.1:35254", env = "ZUMQ_ADDR")]
    addr: String,

    /// Таймаут соединения в секундах
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Опубликовать сообщения в адрес, по одному на аргумент
    Send {
        address: String,
        #[arg(required = true)]
        payloads: Vec<String>,
    },
    /// Получить сообщения из адреса
    Receive {
        address: String,
        /// Сколько сообщений получить
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Отклонять полученные сообщения (они вернутся в очередь)
        #[arg(long)]
        reject: bool,
        /// Сколько секунд ждать каждое сообщение; без флага ждать всегда
        #[arg(long)]
        wait: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = ClientConfig {
        connect_timeout: Duration::from_secs(cli.timeout),
        ..Default::default()
    };

    match cli.command {
        Commands::Send { address, payloads } => {
            let mut producer = Producer::connect(&cli.addr, &address, &config)
                .await
                .with_context(|| format!("failed to attach to '{address}'"))?;
            for payload in payloads {
                let outcome = producer.send(payload.clone()).await?;
                println!("{payload}: {outcome}");
            }
            producer.close().await?;
        }
        Commands::Receive {
            address,
            count,
            reject,
            wait,
        } => {
            config.read_timeout = wait.map(Duration::from_secs);
            let mut consumer = Consumer::connect(&cli.addr, &address, &config)
                .await
                .with_context(|| format!("failed to attach to '{address}'"))?;
            let outcome = if reject {
                Outcome::Rejected
            } else {
                Outcome::Accepted
            };
            for _ in 0..count {
                let received = consumer.receive().await?;
                println!("{}", String::from_utf8_lossy(&received.payload));
                consumer.settle(received.delivery_id, outcome).await?;
                debug!(delivery_id = received.delivery_id, outcome = %outcome, "Settled");
            }
            consumer.close().await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "error" };

    fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
