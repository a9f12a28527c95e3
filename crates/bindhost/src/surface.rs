//! A headless UI that plays a fixed script against the bridge.

use std::sync::Arc;

use tokio::sync::Notify;

use bindrun::Client;
use bindrun::Surface;
use bindwire::Value;

pub struct ScriptedUi {
    client: Arc<Client>,
    done: Arc<Notify>,
}

impl ScriptedUi {
    pub fn new(client: Client) -> Self {
        Self { client: Arc::new(client), done: Arc::new(Notify::new()) }
    }
}

#[async_trait::async_trait]
impl Surface for ScriptedUi {
    async fn load(&self) -> anyhow::Result<()> {
        self.client.on("changed", |payload| {
            tracing::info!(%payload, "ui saw notes change");
        });

        let client = self.client.clone();
        let done = self.done.clone();
        tokio::spawn(async move {
            if let Err(e) = script(&client).await {
                tracing::error!("ui script failed: {:#}", e);
            }
            done.notify_one();
        });
        Ok(())
    }

    async fn closed(&self) {
        // notify_one leaves a permit if the script finished first.
        self.done.notified().await;
    }
}

async fn script(client: &Client) -> anyhow::Result<()> {
    let first = client
        .call("notes", "add", vec![Value::Str("groceries".into()), Value::Str("eggs, flour".into())])
        .await?;
    client.call("notes", "add", vec![Value::Str("call back".into())]).await?;
    tracing::info!(id = %first, "ui added notes");

    let listed = client.call("notes", "list", vec![]).await?;
    tracing::info!(notes = %listed, "ui listed notes");

    let removed = client.call("notes", "remove", vec![first]).await?;
    tracing::info!(%removed, "ui removed the first note");

    let sum = client.call("math", "add", vec![Value::Int(2), Value::Int(3)]).await?;
    tracing::info!(%sum, "ui added numbers");

    let now = client.call("clock", "now", vec![]).await?;
    tracing::info!(%now, "ui read the host clock");

    // Runtime failures come back as replies, not crashes.
    match client.call("math", "add", vec![Value::Int(1), Value::Str("two".into())]).await {
        Ok(value) => tracing::warn!(%value, "bad argument was accepted"),
        Err(e) => tracing::info!(kind = ?e.failure_kind(), "ui got {}", e),
    }
    match client.call("notes", "archive", vec![]).await {
        Ok(value) => tracing::warn!(%value, "unknown method answered"),
        Err(e) => tracing::info!(kind = ?e.failure_kind(), "ui got {}", e),
    }
    Ok(())
}
