//! The `TerminalUi` collaborator boundary and its minimal concrete adapter.
//!
//! §6 specifies the UI purely as an interface the network thread calls into;
//! this module provides the thin terminal adapter the binary ships, plus the
//! [`UiEvent`] shape carried across the network↔UI channel in place of the
//! distilled original's single atomic command slot.

use crate::config::Config;
use codec::Handle;
use engine::{NatProbeResult, PeerStatus};

/// Everything the network thread can report to the UI thread.
///
/// Carried one at a time over a single-slot bounded channel (see
/// [`crate::network::run`]): the sender blocks until the previous event has
/// been drained, giving the same back-pressure the distilled original's
/// atomic command slot provided, without its single-in-flight-command
/// fragility.
pub enum UiEvent {
    NatInfo(NatProbeResult),
    ServerStatus(String),
    Client {
        handle: Handle,
        nickname: String,
        status: PeerStatus,
    },
    FatalError(String),
}

/// External collaborator consumed by the network thread (conceptually —
/// the concrete binary drives it from the UI thread instead, reacting to
/// [`UiEvent`]s relayed over the channel).
pub trait TerminalUi {
    fn set_nat_info(&mut self, result: NatProbeResult);
    fn set_server_status(&mut self, status: &str);
    fn set_client(&mut self, handle: Handle, nickname: &str, status: PeerStatus);
    fn ask_user_config(&mut self, config: &Config) -> Config;
    fn on_fatal_error(&mut self, msg: &str);
}

/// Prints current state to stdout and accepts no interactive input beyond
/// the process arguments already parsed into `Config` — satisfies the
/// `TerminalUi` trait boundary without a real interactive control surface.
#[derive(Default)]
pub struct PrintingUi;

impl TerminalUi for PrintingUi {
    fn set_nat_info(&mut self, result: NatProbeResult) {
        println!(
            "nat: type={:?} gray={} white={}",
            result.nat_type,
            result.gray_address,
            result
                .white_address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
    }

    fn set_server_status(&mut self, status: &str) {
        println!("status: {status}");
    }

    fn set_client(&mut self, handle: Handle, nickname: &str, status: PeerStatus) {
        println!("peer {handle:?} {nickname:?}: {status:?}");
    }

    fn ask_user_config(&mut self, config: &Config) -> Config {
        config.clone()
    }

    fn on_fatal_error(&mut self, msg: &str) {
        eprintln!("fatal: {msg}");
    }
}
