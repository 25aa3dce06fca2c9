//! The client endpoint (F): one TCP connection, pumping packets between the
//! local TUN and the transport (§4.2).
//!
//! `Client::connect` dials the server, wraps the connection in the
//! encrypted+compressed transport, and opens the TUN device; a failure at
//! either stage releases whatever the earlier stage acquired. `Client::run`
//! starts the four workers of §4.2 and the handshake control frame, then
//! blocks until the shutdown signal fires or either reader errors.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::config::EndpointConfig;
use crate::crypto::CipherKind;
use crate::frame::{make_control_frame, Frame};
use crate::transport::Transport;
use crate::tun::Tun;
use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 1024;
const TUN_READ_BUF: usize = 65536;

pub struct Client {
    config: Arc<EndpointConfig>,
    socket: TcpStream,
    tun: Tun,
}

impl Client {
    /// Dials `connect_addr` with the configured timeout, then opens the TUN
    /// device. If opening the TUN fails, the already-established socket is
    /// dropped before returning.
    pub async fn connect(config: EndpointConfig, connect_addr: &str) -> Result<Self> {
        let socket = tokio::time::timeout(config.timeout, TcpStream::connect(connect_addr))
            .await
            .map_err(|_| Error::ConnectTimeout(connect_addr.to_string()))??;

        let tun = match Tun::open(&config.name, config.persist) {
            Ok(tun) => tun,
            Err(e) => return Err(Error::Tun(e.to_string())),
        };
        tracing::info!(interface = tun.name(), "tun interface created");

        Ok(Client { config: Arc::new(config), socket, tun })
    }

    /// Runs until `signal` resolves or either reader (TUN, transport)
    /// errors. All four workers exit before this returns.
    pub async fn run(self, signal: impl Future<Output = ()>) -> Result<()> {
        let Client { config, socket, tun } = self;
        let (tun_read, tun_write) = tokio::io::split(tun);
        let (transport_reader, transport_writer) =
            Transport::new(socket, CipherKind::ChaCha20, &config.password, true);

        let (to_server_tx, to_server_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (to_tun_tx, to_tun_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (done_tx, done_rx) = watch::channel(false);
        let worker_ended = Arc::new(Notify::new());

        // Primes the server's routing table before the first real packet.
        let _ = to_server_tx.try_send(make_control_frame(config.ip));

        let tun_reader = spawn_notifying(
            worker_ended.clone(),
            run_tun_reader(config.clone(), tun_read, to_server_tx.clone(), done_rx.clone()),
        );
        let tun_writer = spawn_notifying(
            worker_ended.clone(),
            run_tun_writer(tun_write, to_tun_rx, done_rx.clone()),
        );
        let transport_writer_task = spawn_notifying(
            worker_ended.clone(),
            run_transport_writer(transport_writer, to_server_rx, done_rx.clone()),
        );
        let transport_reader_task = spawn_notifying(
            worker_ended.clone(),
            run_transport_reader(config.clone(), transport_reader, to_tun_tx, done_rx.clone()),
        );

        tokio::pin!(signal);
        tokio::select! {
            _ = &mut signal => tracing::info!("shutdown signal received"),
            _ = worker_ended.notified() => tracing::warn!("a worker terminated, shutting down"),
        }

        let _ = done_tx.send(true);

        let _ = tun_reader.await;
        let _ = tun_writer.await;
        let _ = transport_writer_task.await;
        let _ = transport_reader_task.await;

        Ok(())
    }
}

fn spawn_notifying<F>(notify: Arc<Notify>, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        fut.await;
        notify.notify_one();
    })
}

async fn run_tun_reader(
    config: Arc<EndpointConfig>,
    mut tun_read: tokio::io::ReadHalf<Tun>,
    to_server_tx: mpsc::Sender<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    tracing::info!("tun device opened");
    let mut buf = vec![0u8; TUN_READ_BUF];

    loop {
        let n = tokio::select! {
            result = tun_read.read(&mut buf) => match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to get next frame from tun");
                    break;
                }
            },
            _ = done.changed() => break,
        };

        let Some(view) = Frame::decode(&buf[..n]) else { continue };
        let (source, destination) = (view.source(), view.destination());

        if source != config.ip || !config.is_foreign_member(destination) {
            tracing::debug!(%source, %destination, "tun: dropped, failed client ingress filter");
            continue;
        }

        tracing::debug!(%source, %destination, size = view.payload().len(), "tun: packet");
        if to_server_tx.send(view.to_owned_bytes()).await.is_err() {
            break;
        }
    }
    tracing::info!("tun device reader stopped");
}

async fn run_tun_writer(
    mut tun_write: tokio::io::WriteHalf<Tun>,
    mut to_tun_rx: mpsc::Receiver<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = to_tun_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = tun_write.write_all(&frame).await {
                    tracing::warn!(error = %e, "failed to write frame to tun");
                    break;
                }
            }
            _ = done.changed() => break,
        }
    }
    tracing::info!("tun device writer stopped");
}

async fn run_transport_writer(
    mut transport_writer: crate::transport::TransportWriter,
    mut to_server_rx: mpsc::Receiver<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = to_server_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = transport_writer.write_frame(&frame).await {
                    tracing::warn!(error = %e, "failed to write frame to server");
                    break;
                }
            }
            _ = done.changed() => break,
        }
    }
    tracing::info!("server connection sender stopped");
}

async fn run_transport_reader(
    config: Arc<EndpointConfig>,
    mut transport_reader: crate::transport::TransportReader,
    to_tun_tx: mpsc::Sender<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            result = transport_reader.read_frame() => match result {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to get next frame from server");
                    break;
                }
            },
            _ = done.changed() => break,
        };

        let Some(view) = Frame::decode(&frame) else {
            tracing::debug!("tcp: malformed frame, discarding");
            continue;
        };
        let (source, destination) = (view.source(), view.destination());

        if destination != config.ip || source == destination || !config.network.contains(&source) {
            tracing::debug!(%source, %destination, "tcp: dropped, failed client egress filter");
            continue;
        }

        tracing::debug!(%source, %destination, size = view.payload().len(), "tcp: packet");
        if to_tun_tx.send(view.to_owned_bytes()).await.is_err() {
            break;
        }
    }
    tracing::info!("server connection receiver stopped");
}
