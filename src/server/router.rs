//! The router: the server's sole owner of the routing table (§4.3.2).
//!
//! A single-consumer loop over three channels (`queue`, `register`, `done`)
//! that is the only place `routes` is ever read or written. Centralizing
//! every mutation here, rather than behind a shared `Mutex<HashMap<..>>`,
//! makes the table's transition function serial and — per §8's "routing
//! table determinism" property — dependent only on the input sequence, not
//! on scheduling (see DESIGN.md's note on the source's two variants).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tokio::sync::{mpsc, watch};

/// A routing-table mutation: bind or unbind `channel` from a tunnel address.
pub struct Registration {
    pub channel: mpsc::Sender<Vec<u8>>,
    /// `Some(addr)` to (re)bind `channel` to `addr`, last-writer-wins.
    /// `None` to remove every entry currently bound to `channel`.
    pub source: Option<Ipv4Addr>,
}

/// Runs the router until `done` fires. Frames destined to `server_ip` are
/// pushed onto `local` (blocking — the local TUN egress is authoritative);
/// all others are looked up in `routes` and offered to the matching
/// session's egress queue with a non-blocking `try_send`, dropping on a full
/// or closed queue rather than stalling the switch.
pub async fn run(
    server_ip: Ipv4Addr,
    mut queue: mpsc::Receiver<Vec<u8>>,
    mut register: mpsc::Receiver<Registration>,
    local: mpsc::Sender<Vec<u8>>,
    mut done: watch::Receiver<bool>,
) {
    tracing::info!("router started");
    let mut routes: HashMap<Ipv4Addr, mpsc::Sender<Vec<u8>>> = HashMap::new();

    loop {
        tokio::select! {
            _ = done.changed() => {
                if *done.borrow() {
                    break;
                }
            }

            frame = queue.recv() => {
                let Some(frame) = frame else { break };
                route_frame(server_ip, &routes, &local, frame).await;
            }

            reg = register.recv() => {
                let Some(reg) = reg else { continue };
                apply_registration(&mut routes, reg);
            }
        }
    }

    tracing::info!("router stopped");
}

async fn route_frame(
    server_ip: Ipv4Addr,
    routes: &HashMap<Ipv4Addr, mpsc::Sender<Vec<u8>>>,
    local: &mpsc::Sender<Vec<u8>>,
    frame: Vec<u8>,
) {
    let destination = match crate::frame::Frame::decode(&frame) {
        Some(f) => f.destination(),
        None => return,
    };

    if destination == server_ip {
        let _ = local.send(frame).await;
        return;
    }

    match routes.get(&destination) {
        Some(egress) => {
            if egress.try_send(frame).is_err() {
                tracing::debug!(%destination, "egress queue full or closed, dropping frame");
            }
        }
        None => {
            tracing::debug!(%destination, "no route, dropping frame");
        }
    }
}

fn apply_registration(routes: &mut HashMap<Ipv4Addr, mpsc::Sender<Vec<u8>>>, reg: Registration) {
    match reg.source {
        Some(addr) => {
            tracing::info!(%addr, "route registered");
            routes.insert(addr, reg.channel);
        }
        None => {
            routes.retain(|addr, channel| {
                let keep = !channel.same_channel(&reg.channel);
                if !keep {
                    tracing::info!(%addr, "route removed");
                }
                keep
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::make_control_frame;

    fn ipv4_frame(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
        let total = 20 + payload.len();
        let mut buf = vec![0u8; total];
        buf[0] = (4 << 4) | 5;
        buf[2] = (total >> 8) as u8;
        buf[3] = (total & 0xff) as u8;
        buf[12..16].copy_from_slice(&src.octets());
        buf[16..20].copy_from_slice(&dst.octets());
        buf[20..].copy_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn frame_to_server_goes_local() {
        let server_ip: Ipv4Addr = "172.18.0.1".parse().unwrap();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (register_tx, register_rx) = mpsc::channel(8);
        let (local_tx, mut local_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = watch::channel(false);
        drop(register_tx);

        let handle = tokio::spawn(run(server_ip, queue_rx, register_rx, local_tx, done_rx));

        let frame = make_control_frame(server_ip);
        queue_tx.send(frame.clone()).await.unwrap();
        assert_eq!(local_rx.recv().await.unwrap(), frame);

        done_tx.send(true).unwrap();
        drop(queue_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn frame_with_no_route_is_dropped_silently() {
        let server_ip: Ipv4Addr = "172.18.0.1".parse().unwrap();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (register_tx, register_rx) = mpsc::channel(8);
        let (local_tx, mut local_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = watch::channel(false);
        drop(register_tx);

        let handle = tokio::spawn(run(server_ip, queue_rx, register_rx, local_tx, done_rx));

        let frame = ipv4_frame(
            "172.18.0.2".parse().unwrap(),
            "172.18.0.3".parse().unwrap(),
            b"payload",
        );
        queue_tx.send(frame).await.unwrap();

        done_tx.send(true).unwrap();
        drop(queue_tx);
        handle.await.unwrap();
        assert!(local_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn registration_then_rebind_then_removal() {
        let server_ip: Ipv4Addr = "172.18.0.1".parse().unwrap();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (register_tx, register_rx) = mpsc::channel(8);
        let (local_tx, _local_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = watch::channel(false);

        let handle = tokio::spawn(run(server_ip, queue_rx, register_rx, local_tx, done_rx));

        let client_ip: Ipv4Addr = "172.18.0.2".parse().unwrap();
        let (session1_tx, mut session1_rx) = mpsc::channel(8);
        register_tx
            .send(Registration { channel: session1_tx.clone(), source: Some(client_ip) })
            .await
            .unwrap();

        let other_ip: Ipv4Addr = "172.18.0.3".parse().unwrap();
        let (session2_tx, mut session2_rx) = mpsc::channel(8);
        register_tx
            .send(Registration { channel: session2_tx.clone(), source: Some(other_ip) })
            .await
            .unwrap();

        let to_client2 = ipv4_frame(client_ip, other_ip, b"hello");
        queue_tx.send(to_client2.clone()).await.unwrap();
        assert_eq!(session2_rx.recv().await.unwrap(), to_client2);

        // session1 disconnects: deregister
        register_tx
            .send(Registration { channel: session1_tx.clone(), source: None })
            .await
            .unwrap();

        // give the router a moment to process the deregistration before
        // reconnecting the same tunnel IP on a new session
        tokio::task::yield_now().await;

        let (session3_tx, mut session3_rx) = mpsc::channel(8);
        register_tx
            .send(Registration { channel: session3_tx.clone(), source: Some(client_ip) })
            .await
            .unwrap();

        let to_client1 = ipv4_frame(other_ip, client_ip, b"rebound");
        queue_tx.send(to_client1.clone()).await.unwrap();
        assert_eq!(session3_rx.recv().await.unwrap(), to_client1);
        assert!(session1_rx.try_recv().is_err());

        drop(register_tx);
        drop(queue_tx);
        handle.await.unwrap();
    }
}
