use std::time::Duration;

use telesim::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

const DEFAULT_PORT: &str = "15233";

/// `TELESIM_BIND` wins; otherwise `0.0.0.0:$SERVER_PORT`, port 15233 by
/// default.
fn bind_addr(var: impl Fn(&str) -> Option<String>) -> String {
    if let Some(addr) = var("TELESIM_BIND").filter(|a| !a.trim().is_empty()) {
        return addr;
    }
    let port = var("SERVER_PORT")
        .filter(|p| p.trim().parse::<u16>().is_ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    format!("0.0.0.0:{}", port.trim())
}

/// `TELESIM_TICK_MS`, if set to a positive integer.
fn tick_interval(var: impl Fn(&str) -> Option<String>) -> Option<Duration> {
    var("TELESIM_TICK_MS")
        .and_then(|ms| ms.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let env = |key: &str| std::env::var(key).ok();
    let addr = bind_addr(env);
    let mut config = EngineConfig::default();
    if let Some(interval) = tick_interval(env) {
        config = config.with_tick_interval(interval);
    }

    let server = TelesimServerBuilder::new()
        .bind(&addr)
        .config(config)
        .build(MemoryStore::new())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "telemetry server listening");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
        }
        on_signal.cancel();
    });

    server.run(cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures_util::{SinkExt, StreamExt};
    use telesim::protocol::{Envelope, Payload, Request, Response};
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_bind_defaults_to_port_15233() {
        assert_eq!(bind_addr(vars(&[])), "0.0.0.0:15233");
    }

    #[test]
    fn test_bind_uses_server_port() {
        assert_eq!(bind_addr(vars(&[("SERVER_PORT", "9000")])), "0.0.0.0:9000");
        assert_eq!(bind_addr(vars(&[("SERVER_PORT", "not a port")])), "0.0.0.0:15233");
    }

    #[test]
    fn test_explicit_bind_wins() {
        let env = vars(&[("TELESIM_BIND", "127.0.0.1:7000"), ("SERVER_PORT", "9000")]);
        assert_eq!(bind_addr(env), "127.0.0.1:7000");
    }

    #[test]
    fn test_tick_interval_parsing() {
        assert_eq!(tick_interval(vars(&[])), None);
        assert_eq!(
            tick_interval(vars(&[("TELESIM_TICK_MS", "250")])),
            Some(Duration::from_millis(250))
        );
        assert_eq!(tick_interval(vars(&[("TELESIM_TICK_MS", "0")])), None);
        assert_eq!(tick_interval(vars(&[("TELESIM_TICK_MS", "fast")])), None);
    }

    #[tokio::test]
    async fn test_create_and_start_over_websocket() {
        let server = TelesimServerBuilder::new()
            .bind("127.0.0.1:0")
            .tick_interval(Duration::from_millis(20))
            .build(MemoryStore::new())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        let send = |payload| {
            let env = Envelope { seq: 1, timestamp: 0, payload };
            Message::text(serde_json::to_string(&env).unwrap())
        };
        let recv = |msg: Message| -> Envelope { serde_json::from_slice(&msg.into_data()).unwrap() };

        ws.send(send(Payload::Request(Request::CreateSession { name: None })))
            .await
            .unwrap();
        let Payload::Response(Response::SessionCreated { session_id }) =
            recv(ws.next().await.unwrap().unwrap()).payload
        else {
            panic!("expected SessionCreated");
        };

        ws.send(send(Payload::Request(Request::StartGeneration {
            session_id: Some(session_id),
        })))
        .await
        .unwrap();
        let reply = recv(ws.next().await.unwrap().unwrap()).payload;
        assert_eq!(reply, Payload::Response(Response::GenerationStarted { session_id }));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
