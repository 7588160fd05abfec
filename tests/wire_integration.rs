//! Сквозные тесты брокера поверх TCP: клиентские `Producer`/`Consumer`
//! против настоящего `Broker`.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};
use zumq::{
    Broker, ClientConfig, ClientError, Consumer, LinkError, Outcome, OverflowPolicy, Producer,
    Provisioning, QueueSpec, Settings, TrackerSnapshot,
};

fn client_config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Some(Duration::from_secs(5)),
        write_timeout: Duration::from_secs(2),
    }
}

/// Запускает брокер на свободном порту и возвращает его вместе с адресом.
async fn start_broker(settings: Settings) -> Result<(Arc<Broker>, String)> {
    let broker = Arc::new(Broker::new(settings)?);
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?.to_string();

    let server = broker.clone();
    tokio::spawn(async move { server.serve(listener).await });

    Ok((broker, addr))
}

async fn wait_for_stats(
    broker: &Broker,
    cond: impl Fn(&TrackerSnapshot) -> bool,
) -> TrackerSnapshot {
    timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = broker.tracker_stats();
            if cond(&snapshot) {
                return snapshot;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("broker counters did not converge")
}

/// Тест проверяет полный путь сообщения: производитель → очередь →
/// потребитель → подтверждение.
#[tokio::test]
async fn producer_to_consumer_round_trip() -> Result<()> {
    let (broker, addr) = start_broker(Settings::default()).await?;
    let config = client_config();

    let mut producer = Producer::connect(&addr, "orders", &config).await?;
    assert_eq!(producer.send("hello").await?, Outcome::Accepted);
    assert_eq!(producer.send("world").await?, Outcome::Accepted);

    let mut consumer = Consumer::connect(&addr, "orders", &config).await?;
    let first = consumer.receive().await?;
    let second = consumer.receive().await?;
    assert_eq!(&first.payload[..], b"hello");
    assert_eq!(&second.payload[..], b"world");

    consumer.accept(first.delivery_id).await?;
    consumer.accept(second.delivery_id).await?;

    let snapshot = wait_for_stats(&broker, |s| s.accepted == 2).await;
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(snapshot.requeued, 0);

    producer.close().await?;
    consumer.close().await?;
    Ok(())
}

/// Тест проверяет, что отклонённое потребителем сообщение доставляется
/// повторно с новым идентификатором доставки.
#[tokio::test]
async fn rejected_message_is_redelivered() -> Result<()> {
    let (broker, addr) = start_broker(Settings::default()).await?;
    let config = client_config();

    let mut producer = Producer::connect(&addr, "jobs", &config).await?;
    assert_eq!(producer.send("task-1").await?, Outcome::Accepted);

    let mut consumer = Consumer::connect(&addr, "jobs", &config).await?;
    let first = consumer.receive().await?;
    consumer.reject(first.delivery_id).await?;

    let again = consumer.receive().await?;
    assert_eq!(again.payload, first.payload);
    assert_ne!(again.delivery_id, first.delivery_id);
    consumer.accept(again.delivery_id).await?;

    let snapshot = wait_for_stats(&broker, |s| s.accepted == 1).await;
    assert_eq!(snapshot.requeued, 1);
    Ok(())
}

/// Тест проверяет, что неподтверждённая доставка ушедшего потребителя
/// возвращается в очередь и достаётся следующему.
#[tokio::test]
async fn unsettled_delivery_survives_consumer_close() -> Result<()> {
    let (broker, addr) = start_broker(Settings::default()).await?;
    let config = client_config();

    let mut producer = Producer::connect(&addr, "mail", &config).await?;
    assert_eq!(producer.send("letter").await?, Outcome::Accepted);

    let mut first = Consumer::connect(&addr, "mail", &config).await?;
    let delivered = first.receive().await?;
    assert_eq!(&delivered.payload[..], b"letter");
    first.close().await?;

    wait_for_stats(&broker, |s| s.requeued >= 1).await;

    let mut second = Consumer::connect(&addr, "mail", &config).await?;
    let redelivered = second.receive().await?;
    assert_eq!(&redelivered.payload[..], b"letter");
    second.accept(redelivered.delivery_id).await?;

    wait_for_stats(&broker, |s| s.accepted == 1 && s.in_flight == 0).await;
    Ok(())
}

/// Тест проверяет, что при явной регистрации очередей линк на неизвестный
/// адрес отсоединяется брокером.
#[tokio::test]
async fn explicit_provisioning_detaches_unknown_address() -> Result<()> {
    let settings = Settings {
        provisioning: Provisioning::Explicit,
        queues: vec![QueueSpec {
            address: "known".into(),
            capacity: Some(4),
        }],
        ..Default::default()
    };
    let (broker, addr) = start_broker(settings).await?;
    let config = client_config();

    let mut consumer = Consumer::connect(&addr, "unknown", &config).await?;
    let err = consumer.receive().await.unwrap_err();
    assert!(
        matches!(err, ClientError::Link(LinkError::Detached { .. })),
        "unexpected error: {err:?}"
    );

    let mut producer = Producer::connect(&addr, "unknown", &config).await?;
    assert!(producer.send("lost").await.is_err());

    assert!(broker.exchange().load("unknown").is_none());
    assert!(broker.exchange().load("known").is_some());
    Ok(())
}

/// Тест проверяет политику `Reject`: доставка в заполненную очередь
/// отклоняется у производителя, содержимое очереди не меняется.
#[tokio::test]
async fn reject_policy_rejects_on_full_queue() -> Result<()> {
    let settings = Settings {
        overflow_policy: OverflowPolicy::Reject,
        provisioning: Provisioning::Explicit,
        queues: vec![QueueSpec {
            address: "tiny".into(),
            capacity: Some(1),
        }],
        ..Default::default()
    };
    let (broker, addr) = start_broker(settings).await?;

    let mut producer = Producer::connect(&addr, "tiny", &client_config()).await?;
    assert_eq!(producer.send("first").await?, Outcome::Accepted);
    assert_eq!(producer.send("second").await?, Outcome::Rejected);

    let queue = broker.exchange().load("tiny").unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(&queue.try_dequeue().unwrap().payload[..], b"first");
    Ok(())
}

/// Тест проверяет, что брокер восполняет кредит производителя после
/// каждой подтверждённой доставки.
#[tokio::test]
async fn producer_credit_is_replenished() -> Result<()> {
    let settings = Settings {
        credit: 3,
        ..Default::default()
    };
    let (_broker, addr) = start_broker(settings).await?;

    let mut producer = Producer::connect(&addr, "window", &client_config()).await?;
    assert_eq!(producer.send("m0").await?, Outcome::Accepted);
    assert_eq!(producer.credit(), 2);

    for i in 1..10 {
        let outcome = producer.send(format!("m{i}")).await?;
        assert_eq!(outcome, Outcome::Accepted);
    }
    assert!(producer.credit() <= 3);
    Ok(())
}

/// Тест проверяет, что на некорректную строку брокер отвечает кадром
/// `ERROR` и не закрывает соединение.
#[tokio::test]
async fn malformed_frame_gets_error_reply() -> Result<()> {
    let (_broker, addr) = start_broker(Settings::default()).await?;

    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    write_half.write_all(b"BOGUS 1 2 3\r\n").await?;
    timeout(Duration::from_secs(2), reader.read_line(&mut line)).await??;
    assert!(line.starts_with("ERROR "), "expected ERROR, got {line:?}");

    line.clear();
    write_half.write_all(b"ATTACH 5 receiver still-open\r\n").await?;
    timeout(Duration::from_secs(2), reader.read_line(&mut line)).await??;
    assert_eq!(line, "ATTACHED 5\r\n");
    Ok(())
}

/// Тест проверяет, что производитель, игнорирующий `FLOW`, не может
/// превысить окно кредита: линк отсоединяется, лишние доставки не попадают
/// в очередь.
#[tokio::test]
async fn transfer_beyond_credit_detaches_link() -> Result<()> {
    const TRANSFERS: usize = 50;

    let settings = Settings {
        credit: 1,
        ..Default::default()
    };
    let (broker, addr) = start_broker(settings).await?;

    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    write_half.write_all(b"ATTACH 0 sender flood\r\n").await?;
    timeout(Duration::from_secs(2), reader.read_line(&mut line)).await??;
    assert_eq!(line, "ATTACHED 0\r\n");
    line.clear();
    timeout(Duration::from_secs(2), reader.read_line(&mut line)).await??;
    assert_eq!(line, "FLOW 0 1\r\n");

    let mut burst = String::new();
    for i in 0..TRANSFERS {
        burst.push_str(&format!("TRANSFER 0 {i} m{i}\r\n"));
    }
    write_half.write_all(burst.as_bytes()).await?;

    let detached = timeout(Duration::from_secs(2), async {
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok::<_, std::io::Error>(false);
            }
            if line.starts_with("DETACH 0") {
                return Ok(true);
            }
        }
    })
    .await??;
    assert!(detached, "link was not detached");
    assert!(line.contains("credit"), "unexpected detach reason: {line:?}");

    sleep(Duration::from_millis(50)).await;
    let queue = broker.exchange().load("flood").unwrap();
    assert!(
        queue.len() < TRANSFERS,
        "credit not enforced: {} messages queued",
        queue.len()
    );
    Ok(())
}
