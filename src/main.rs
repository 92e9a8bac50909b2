#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod network;
mod socket;
mod ui;

use clap::Parser;
use config::{Cli, Config};
use std::sync::mpsc;
use ui::{PrintingUi, TerminalUi, UiEvent};

fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let config = Config::try_from(Cli::parse())?;
    let mut terminal = PrintingUi::default();
    let config = terminal.ask_user_config(&config);

    if !config.is_valid() {
        anyhow::bail!("invalid configuration: a nickname is required, and an ordinary node needs --remote-address");
    }

    // Single-slot bounded channel: the network thread blocks on `send`
    // until the UI thread has drained the previous event, giving the
    // distilled original's atomic command slot's back-pressure without its
    // single-in-flight-command fragility (§5, §9).
    let (tx, rx) = mpsc::sync_channel(1);

    let network_config = config.clone();
    std::thread::spawn(move || network::run(network_config, tx));

    while let Ok(event) = rx.recv() {
        match event {
            UiEvent::NatInfo(result) => terminal.set_nat_info(result),
            UiEvent::ServerStatus(status) => terminal.set_server_status(&status),
            UiEvent::Client {
                handle,
                nickname,
                status,
            } => terminal.set_client(handle, &nickname, status),
            UiEvent::FatalError(msg) => {
                terminal.on_fatal_error(&msg);
                anyhow::bail!(msg);
            }
        }
    }

    Ok(())
}
