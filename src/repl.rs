//! Interactive console mode
//!
//! Reads utterances line by line and prints replies, sharing the same
//! orchestrator and memory store as the HTTP surface.

use crate::memory::MemoryBackend;
use crate::orchestrator::InteractionOrchestrator;
use crate::{HalcyonError, Result};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const PROMPT_NAME: &str = "Halcyon";

fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit")
}

/// Forward stdin lines into a channel from a dedicated thread.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Print everything sent on the returned channel to stdout.
///
/// The task ends once every sender is dropped; await its handle to flush.
pub fn spawn_stdout_writer() -> (mpsc::Sender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(32);
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writeln!(io::stdout(), "{}", msg) {
                error!("Error writing stdout: {}", e);
                break;
            }
            let _ = io::stdout().flush();
        }
    });
    (tx, writer)
}

/// Run the console loop until `exit`/`quit` or end of input.
///
/// On the way out the log is copied to `backup`, when one is given.
pub async fn run(
    orchestrator: Arc<InteractionOrchestrator>,
    backup: Option<Arc<dyn MemoryBackend>>,
    mut input: mpsc::Receiver<String>,
    output: mpsc::Sender<String>,
) -> Result<()> {
    let send = |msg: String| {
        let output = output.clone();
        async move {
            output
                .send(msg)
                .await
                .map_err(|_| HalcyonError::Internal("console output closed".to_string()))
        }
    };

    send(format!(
        "{} is listening ({} remembered exchanges). Type 'exit' to quit.",
        PROMPT_NAME,
        orchestrator.store().len().await
    ))
    .await?;

    while let Some(line) = input.recv().await {
        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match orchestrator.interact(&line).await {
            Ok(interaction) => send(format!("{}: {}", PROMPT_NAME, interaction.response)).await?,
            Err(e) if e.is_validation() => send(format!("({})", e)).await?,
            Err(e) => {
                warn!("Console interaction failed: {}", e);
                send(format!("({})", e)).await?;
            }
        }
    }

    if let Some(target) = backup {
        match orchestrator.store().backup(target.as_ref()).await {
            Ok(entries) => info!("Saved {} entries to {}", entries, target.describe()),
            Err(e) => warn!("Backup on exit failed: {}", e),
        }
    }
    send(format!("{}: Goodbye.", PROMPT_NAME)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::EchoClient;
    use crate::memory::{InMemoryBackend, MemoryStore};
    use crate::orchestrator::OrchestratorSettings;

    async fn orchestrator() -> Arc<InteractionOrchestrator> {
        let store = Arc::new(MemoryStore::open(Arc::new(InMemoryBackend::new()), 100).await);
        Arc::new(InteractionOrchestrator::new(
            store,
            Arc::new(EchoClient::new()),
            OrchestratorSettings::default(),
        ))
    }

    async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = rx.recv().await {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn test_stdout_writer_finishes_once_senders_drop() {
        let (tx, writer) = spawn_stdout_writer();
        tx.send("Halcyon: Goodbye.".to_string()).await.unwrap();
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(5), writer)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT "));
        assert!(!is_exit_command("exit now"));
    }

    #[tokio::test]
    async fn test_console_loop_replies_and_stops_on_quit() {
        let orchestrator = orchestrator().await;
        let backup = Arc::new(InMemoryBackend::new());
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(32);

        for line in ["hello there", "", "quit", "never read"] {
            in_tx.send(line.to_string()).await.unwrap();
        }
        drop(in_tx);

        run(orchestrator.clone(), Some(backup.clone()), in_rx, out_tx)
            .await
            .unwrap();

        let lines = drain(out_rx).await;
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Halcyon: You said: \"hello there\""));
        assert_eq!(lines[2], "Halcyon: Goodbye.");
        assert_eq!(orchestrator.store().len().await, 1);
        assert!(backup.exists().await);
    }

    #[tokio::test]
    async fn test_console_loop_reports_rejected_input() {
        let orchestrator = orchestrator().await;
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(32);

        in_tx.send("x".repeat(1001)).await.unwrap();
        drop(in_tx);

        run(orchestrator.clone(), None, in_rx, out_tx).await.unwrap();

        let lines = drain(out_rx).await;
        assert!(lines[1].contains("Input too long"));
        assert!(orchestrator.store().is_empty().await);
    }
}
