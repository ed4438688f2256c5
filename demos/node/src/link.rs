//! Line-oriented stdio link.
//!
//! Stands in for the radio driver: each stdin line is one inbound message,
//! `<peer>\t<text>`; each outbound message is printed to stdout as
//! `<to>\t<text>`. Pipe these to an actual radio daemon to go on the air.

use meshtx_protocol::{Inbound, NodeId, Outbound};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Channel depth between the link and the protocol engines.
const QUEUE_DEPTH: usize = 64;

/// Channel pair bridging stdio to the protocol engines.
pub struct StdioLink {
    /// Messages arriving from peers.
    pub inbound: mpsc::Receiver<Inbound>,
    /// Messages to deliver to peers.
    pub outbound: mpsc::Sender<Outbound>,
}

/// Spawn the reader and writer tasks for a node with the given identity.
pub fn spawn(local: NodeId) -> StdioLink {
    let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((peer, text)) = line.split_once('\t') else {
                debug!(line, "dropping line without peer prefix");
                continue;
            };
            let message = Inbound::text(peer, local.clone(), text);
            if in_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let line = format!("{}\t{}\n", message.to, message.text);
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    StdioLink {
        inbound: in_rx,
        outbound: out_tx,
    }
}
