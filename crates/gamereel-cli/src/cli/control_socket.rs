//! Control socket: server (during `gamereel run`) and client (`gamereel cancel`).
//! Protocol: one line per command, `cancel <game_id>` or `cancel all`.

use anyhow::{bail, Context, Result};
use gamereel_core::control::{CancelRegistry, CancelTarget};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Listen on `path` and apply every well-formed cancel line to `registry`.
/// Malformed lines are logged and ignored.
pub fn spawn_control_listener(
    registry: Arc<CancelRegistry>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let mut lines = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            match CancelTarget::parse_line(&line) {
                                Some(target) => registry.cancel(&target),
                                None => tracing::debug!(line = %line.trim(), "ignored control line"),
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Send one cancel line. Fails when no run is listening.
pub async fn send_cancel(socket_path: &Path, target: &CancelTarget) -> Result<()> {
    if !socket_path.exists() {
        bail!("no active run (control socket {} missing)", socket_path.display());
    }
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    stream.write_all(format!("{}\n", target).as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
