//! The network thread: owns the UDP socket and drives the STUN probe, hole
//! puncher and host state machine to completion, per §5's scheduling model.
//! Never blocks on the UI — every [`UiEvent`] is handed off over a
//! single-slot bounded channel and the loop moves straight on.

use crate::config::Config;
use crate::socket::StdUdpTransport;
use crate::ui::UiEvent;
use codec::Handle;
use engine::{ConnectFailReason, Host, PeerInfo, PeerObserver, StunProbe};
use std::sync::mpsc::SyncSender;
use std::time::Duration;

/// Sleep between `Host::update()` calls, per §5's ~100 kHz network loop.
const TICK: Duration = Duration::from_micros(10);

struct ChannelObserver {
    tx: SyncSender<UiEvent>,
}

impl PeerObserver for ChannelObserver {
    fn on_peer_connected(&mut self, handle: Handle, info: &PeerInfo) {
        let _ = self.tx.send(UiEvent::Client {
            handle,
            nickname: info.nickname.clone(),
            status: info.status,
        });
    }

    fn on_peer_disconnected(&mut self, handle: Handle) {
        log::debug!("peer {handle:?} disconnected");
    }
}

/// Binds the socket, runs the startup STUN probe, then runs the host state
/// machine forever. Fatal setup failures are reported once via
/// `UiEvent::FatalError` and the thread returns.
pub fn run(config: Config, tx: SyncSender<UiEvent>) {
    let mut transport = match StdUdpTransport::bind(config.local_server_address) {
        Ok(transport) => transport,
        Err(e) => {
            let _ = tx.send(UiEvent::FatalError(format!("failed to bind udp socket: {e}")));
            return;
        }
    };

    let probe = StunProbe::default();
    let gray_address = StunProbe::resolve_gray_address(&transport, "8.8.8.8:80");
    let nat_result = probe.classify(&mut transport, config.endpoint, gray_address);
    let _ = tx.send(UiEvent::NatInfo(nat_result));

    let white_address = nat_result.white_address.unwrap_or(gray_address);

    let mut host = Host::new(
        transport,
        config.is_master(),
        config.nickname.clone(),
        gray_address,
        white_address,
    );
    host.set_observer(Box::new(ChannelObserver { tx: tx.clone() }));

    if config.is_master() {
        let _ = tx.send(UiEvent::ServerStatus("listening as master".to_string()));
    } else {
        let fail_tx = tx.clone();
        let remote = [config.remote_server_address, config.remote_server_address];
        host.connect(
            remote,
            Box::new(move |reason| {
                let _ = fail_tx.send(UiEvent::ServerStatus(describe_failure(reason)));
            }),
        );
        let _ = tx.send(UiEvent::ServerStatus(format!(
            "connecting to {}",
            config.remote_server_address
        )));
    }

    loop {
        host.update();

        if host.peers_info_changed() {
            let tx = &tx;
            host.query_peer_infos(|handle, info| {
                let _ = tx.send(UiEvent::Client {
                    handle,
                    nickname: info.nickname,
                    status: info.status,
                });
            });
        }

        std::thread::sleep(TICK);
    }
}

fn describe_failure(reason: ConnectFailReason) -> String {
    match reason {
        ConnectFailReason::InitiateConnectionTimeout => "connect failed: initial punch timed out".into(),
        ConnectFailReason::ConnectionResponseTimeout => "connect failed: master never answered".into(),
        ConnectFailReason::ConnectionNotMaster => "connect failed: remote node is not a master".into(),
        ConnectFailReason::CorruptedChannel => "connect failed: corrupted channel".into(),
    }
}
