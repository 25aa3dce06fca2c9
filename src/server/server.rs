//! The server endpoint (G): listener, TUN pump, and router wiring (§4.3).
//!
//! `Server::bind` acquires both resources construction needs (TCP listener,
//! TUN device) up front, releasing whichever succeeded first if the other
//! fails. `Server::run` starts the four long-lived workers described in
//! §4.3.1 and blocks until the external shutdown signal fires or any worker
//! ends on its own, then tears everything down in the order §5 prescribes:
//! fan a `done` signal out to every worker, join the TUN and listener
//! workers (and, transitively, every session they spawned), then join the
//! router last.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::EndpointConfig;
use crate::crypto::CipherKind;
use crate::frame::Frame;
use crate::server::router::{self, Registration};
use crate::server::session;
use crate::transport::Transport;
use crate::tun::Tun;
use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 1024;
const TUN_READ_BUF: usize = 65536;

pub struct Server {
    config: Arc<EndpointConfig>,
    listener: TcpListener,
    tun: Tun,
}

impl Server {
    /// Binds the TCP listener and opens the TUN device. If the TUN open
    /// fails, the listener (already bound) is dropped before returning.
    pub async fn bind(config: EndpointConfig, listen_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;

        let tun = match Tun::open(&config.name, config.persist) {
            Ok(tun) => tun,
            Err(e) => return Err(Error::Tun(e.to_string())),
        };
        tracing::info!(interface = tun.name(), "tun interface created");

        Ok(Server { config: Arc::new(config), listener, tun })
    }

    /// Runs until `signal` resolves or any worker terminates, then performs
    /// ordered shutdown.
    pub async fn run(self, signal: impl Future<Output = ()>) -> Result<()> {
        let Server { config, listener, tun } = self;
        let (tun_read, tun_write) = tokio::io::split(tun);

        let (local_tx, local_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (queue_tx, queue_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (register_tx, register_rx) = mpsc::channel::<Registration>(CHANNEL_CAPACITY);
        let (done_tx, done_rx) = watch::channel(false);
        let worker_ended = Arc::new(Notify::new());

        let tun_reader = spawn_notifying(
            worker_ended.clone(),
            run_tun_reader(config.clone(), tun_read, queue_tx.clone(), done_rx.clone()),
        );
        let tun_writer = spawn_notifying(
            worker_ended.clone(),
            run_tun_writer(tun_write, local_rx, done_rx.clone()),
        );
        let router = spawn_notifying(
            worker_ended.clone(),
            router::run(config.ip, queue_rx, register_rx, local_tx, done_rx.clone()),
        );
        let listener_task = spawn_notifying(
            worker_ended.clone(),
            run_listener(config.clone(), listener, queue_tx, register_tx, done_rx.clone()),
        );

        tokio::pin!(signal);
        tokio::select! {
            _ = &mut signal => tracing::info!("shutdown signal received"),
            _ = worker_ended.notified() => tracing::warn!("a worker terminated, shutting down"),
        }

        let _ = done_tx.send(true);

        let _ = tun_reader.await;
        let _ = tun_writer.await;
        let _ = listener_task.await;
        let _ = router.await;

        Ok(())
    }
}

/// Spawns `fut`, notifying `notify` once it completes so `run` can race the
/// external shutdown signal against "any worker terminated" without polling
/// the same `JoinHandle` twice.
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
    queue_tx: mpsc::Sender<Vec<u8>>,
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
                    tracing::warn!(error = %e, "failed to read next frame from tun");
                    break;
                }
            },
            _ = done.changed() => break,
        };

        let Some(view) = Frame::decode(&buf[..n]) else { continue };
        let (source, destination) = (view.source(), view.destination());

        if source != config.ip || !config.is_foreign_member(destination) {
            tracing::debug!(%source, %destination, "tun: frame failed server ingress filter");
            continue;
        }

        tracing::debug!(%source, %destination, size = view.payload().len(), "tun: frame");
        if queue_tx.send(view.to_owned_bytes()).await.is_err() {
            break;
        }
    }
    tracing::info!("tun device reader stopped");
}

async fn run_tun_writer(
    mut tun_write: tokio::io::WriteHalf<Tun>,
    mut local_rx: mpsc::Receiver<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = local_rx.recv() => {
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

async fn run_listener(
    config: Arc<EndpointConfig>,
    listener: TcpListener,
    queue_tx: mpsc::Sender<Vec<u8>>,
    register_tx: mpsc::Sender<Registration>,
    mut done: watch::Receiver<bool>,
) {
    let mut sessions: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept tcp connection");
                        break;
                    }
                };
                let (transport_reader, transport_writer) =
                    Transport::new(socket, CipherKind::ChaCha20, &config.password, false);
                sessions.spawn(session::run(
                    config.clone(),
                    peer_addr,
                    transport_reader,
                    transport_writer,
                    queue_tx.clone(),
                    register_tx.clone(),
                ));
            }
            _ = done.changed() => break,
        }
    }

    while sessions.join_next().await.is_some() {}
    tracing::info!("listener stopped");
}
