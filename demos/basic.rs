//! Basic request/response example.
//!
//! Connects to a Redis-compatible server, performs the RESP3 handshake, and
//! runs a SET/GET pair.
//!
//! # Running
//!
//! ```sh
//! REDIS_HOST=localhost REDIS_PASSWORD=secret cargo run --example basic
//! ```

use respwire::{ConnectionConfig, RedisConnection};

#[tokio::main]
async fn main() -> respwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ConnectionConfig {
        host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("REDIS_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(6379),
        label: Some("basic".to_string()),
    };
    let password = std::env::var("REDIS_PASSWORD").unwrap_or_default();

    let mut connection = RedisConnection::new(config);
    connection.connect().await?;
    if !password.is_empty() {
        connection.hello("default", &password, Some("respwire-basic")).await?;
    }

    println!("PING -> {}", connection.send_command(["PING"]).await?);

    connection.send_command(["SET", "foo", "bar"]).await?;
    let reply = connection.send_command(["GET", "foo"]).await?;
    println!("GET foo -> {}", reply.string_value()?);

    connection.disconnect().await?;
    Ok(())
}
