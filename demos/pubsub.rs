//! Pub/sub example: one subscriber connection, one publisher connection.
//!
//! The publisher batches a run of numbered messages and finishes with a
//! `STOP` sentinel; the subscriber drains its message stream until it sees
//! the sentinel. Subscriber connections are dedicated — once subscribed they
//! never return to request/response mode.
//!
//! # Running
//!
//! ```sh
//! REDIS_HOST=localhost REDIS_PASSWORD=secret cargo run --example pubsub
//! ```

use respwire::{ConnectionConfig, PushKind, RedisConnection, RespValue};

const CHANNEL: &str = "respwire-demo-channel";

fn config(label: &str) -> ConnectionConfig {
    ConnectionConfig {
        host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("REDIS_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(6379),
        label: Some(label.to_string()),
    }
}

async fn connect(label: &str) -> respwire::Result<RedisConnection> {
    let mut connection = RedisConnection::new(config(label));
    connection.connect().await?;
    let password = std::env::var("REDIS_PASSWORD").unwrap_or_default();
    if !password.is_empty() {
        connection.hello("default", &password, None).await?;
    }
    Ok(connection)
}

#[tokio::main]
async fn main() -> respwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listener = tokio::spawn(async move {
        let mut connection = connect("listener").await?;
        let mut subscriber = connection.subscribe(&[CHANNEL]).await?;
        let mut received = Vec::new();
        loop {
            let message = subscriber.next_message().await?;
            if message.kind != PushKind::Message {
                continue;
            }
            let payload = message.payload.string_value()?;
            if payload == "STOP" {
                break;
            }
            received.push(payload);
        }
        Ok::<_, respwire::RedisError>(received)
    });

    let publisher = tokio::spawn(async move {
        let mut connection = connect("publisher").await?;
        let commands: Vec<RespValue> = (0..100)
            .map(|i| {
                RespValue::command(vec![
                    "PUBLISH".to_string(),
                    CHANNEL.to_string(),
                    i.to_string(),
                ])
            })
            .collect();
        connection.send_all(&commands).await?;
        // Each batched PUBLISH still gets an integer reply; drain them so
        // the next request/response pair lines up.
        for _ in 0..commands.len() {
            connection.receive().await?;
        }
        connection.publish(CHANNEL, "STOP").await?;
        Ok::<_, respwire::RedisError>(())
    });

    publisher.await.expect("publisher task panicked")?;
    let received = listener.await.expect("listener task panicked")?;
    println!("received {} messages", received.len());
    Ok(())
}
