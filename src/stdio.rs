//! Line-delimited JSON transport.
//!
//! One request per input line, one JSON document per output line. Data events
//! from the background reader are interleaved with responses on the same
//! output, so a single writer task owns it. Blank lines are ignored.
//!
//! End of input tears the session down; queued responses and events are
//! flushed before [`serve`] returns.

use crate::bridge::{Bridge, Outbound};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Serve `bridge` over the process's stdin and stdout.
pub async fn run_stdio_interface(
    bridge: Bridge,
    outbound: mpsc::Receiver<Outbound>,
) -> std::io::Result<()> {
    info!("Serving JSON requests on stdin");
    serve(
        bridge,
        outbound,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Read requests from `input` until EOF, writing responses and data events
/// to `output`.
///
/// `outbound` must be the receiving end of the channel the bridge pushes
/// data events to.
pub async fn serve<R, W>(
    bridge: Bridge,
    outbound: mpsc::Receiver<Outbound>,
    input: R,
    output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = tokio::spawn(write_outbound(outbound, output));
    let responses = bridge.outbound();

    let mut lines = input.lines();
    let read_result = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("Request: {} bytes", line.len());
                let response = bridge.handle_line(line).await;
                if responses.send(Outbound::Response(response)).await.is_err() {
                    // Writer is gone, nobody is listening any more.
                    break Ok(());
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    info!("Input closed, shutting down session");
    if let Err(e) = bridge.session().shutdown().await {
        warn!("Session shutdown failed: {}", e);
    }
    drop(responses);
    drop(bridge);

    let write_result = writer
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    read_result.and(write_result)
}

async fn write_outbound<W>(
    mut outbound: mpsc::Receiver<Outbound>,
    mut output: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    output.shutdown().await
}
