//! One accepted TCP connection at the server (§4.3.3).
//!
//! A session owns a bounded egress queue (`remote`) and runs two workers: a
//! reader that scans frames off the transport, applies the server's
//! session-ingress filter, advertises source changes to the router, and
//! replies to handshake control frames; and a writer that drains `remote`
//! onto the transport. Deregistration happens before the egress queue is
//! closed — see SPEC_FULL.md / spec.md §4.3.3's "Session lifetime
//! invariants".

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::frame::{make_control_frame, Frame};
use crate::server::router::Registration;
use crate::transport::{TransportReader, TransportWriter};

const EGRESS_QUEUE_CAPACITY: usize = 1024;

/// Runs one session to completion: spawns its reader/writer workers, waits
/// for either to finish, then deregisters and tears the transport down.
pub async fn run(
    config: Arc<EndpointConfig>,
    peer_addr: std::net::SocketAddr,
    transport_reader: TransportReader,
    transport_writer: TransportWriter,
    queue: mpsc::Sender<Vec<u8>>,
    register: mpsc::Sender<Registration>,
) {
    tracing::info!(%peer_addr, "client connection established");

    let (remote_tx, remote_rx) = mpsc::channel::<Vec<u8>>(EGRESS_QUEUE_CAPACITY);

    let reader_handle = tokio::spawn(run_reader(
        config.clone(),
        peer_addr,
        transport_reader,
        queue,
        register.clone(),
        remote_tx.clone(),
    ));
    let writer_handle = tokio::spawn(run_writer(peer_addr, transport_writer, remote_rx));

    tokio::select! {
        _ = reader_handle => {}
        _ = writer_handle => {}
    }

    let _ = register.send(Registration { channel: remote_tx, source: None }).await;
    tracing::info!(%peer_addr, "client connection closed");
}

async fn run_reader(
    config: Arc<EndpointConfig>,
    peer_addr: std::net::SocketAddr,
    mut transport_reader: TransportReader,
    queue: mpsc::Sender<Vec<u8>>,
    register: mpsc::Sender<Registration>,
    remote_tx: mpsc::Sender<Vec<u8>>,
) {
    let mut observed_source: Option<Ipv4Addr> = None;
    loop {
        let frame = match transport_reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer_addr, error = %e, "failed to read frame from client");
                break;
            }
        };

        let Some(view) = Frame::decode(&frame) else {
            tracing::debug!(%peer_addr, "malformed frame, discarding");
            continue;
        };
        let source = view.source();
        let destination = view.destination();

        if !config.is_foreign_member(source) || !config.network.contains(&destination) {
            tracing::debug!(%peer_addr, %source, %destination, "frame failed session ingress filter");
            continue;
        }

        if observed_source != Some(source) {
            observed_source = Some(source);
            if register
                .send(Registration { channel: remote_tx.clone(), source: Some(source) })
                .await
                .is_err()
            {
                break;
            }
        }

        if source == destination {
            let reply = make_control_frame(config.ip);
            let _ = remote_tx.try_send(reply);
            continue;
        }

        tracing::debug!(%peer_addr, %source, %destination, size = view.payload().len(), "tcp: frame");
        if queue.send(frame).await.is_err() {
            break;
        }
    }
    tracing::info!(%peer_addr, "client connection receiver stopped");
}

async fn run_writer(
    peer_addr: std::net::SocketAddr,
    mut transport_writer: TransportWriter,
    mut remote_rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(frame) = remote_rx.recv().await {
        if let Err(e) = transport_writer.write_frame(&frame).await {
            tracing::warn!(%peer_addr, error = %e, "failed to write frame to client");
            break;
        }
    }
    tracing::info!(%peer_addr, "client connection sender stopped");
}
