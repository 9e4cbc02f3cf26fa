//! tapwire: point-to-point TUN/TAP tunnel over UDP
//!
//! Usage:
//!   tapwire server --listen 0.0.0.0:22122 --address 10.0.0.1
//!   tapwire client --server 203.0.113.5:22122 --address 10.0.0.2

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tapwire::config::{ClientArgs, Cli, Command, InterfaceArgs, ServerArgs};
use tapwire::{HandshakeGate, RelayEndpoint, VirtualInterface};
use tokio::net::UdpSocket;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins, then --verbose, then info
    let fallback = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .ok();

    match cli.command {
        Command::Server(args) => server(args).await,
        Command::Client(args) => client(args).await,
    }
}

/// Create the interface and apply address, MTU, hardware address and up.
fn provision(args: &InterfaceArgs, address: Ipv4Addr) -> Result<VirtualInterface> {
    let iface = args
        .config()
        .build()
        .with_context(|| format!("creating interface on {}", args.device.display()))?;

    iface
        .set_address(address, args.netmask)
        .with_context(|| format!("assigning {}/{} to {}", address, args.netmask, iface.name()))?;
    iface
        .set_mtu(args.mtu)
        .with_context(|| format!("setting MTU {} on {}", args.mtu, iface.name()))?;
    if let Some(mac) = args.mac {
        let mac = mac.resolve();
        iface
            .set_hardware_address(mac)
            .with_context(|| format!("setting hardware address {} on {}", mac, iface.name()))?;
    }
    iface
        .up()
        .with_context(|| format!("bringing {} up", iface.name()))?;

    info!(
        name = iface.name(),
        flags = %iface.device_flags(),
        %address,
        netmask = %args.netmask,
        mtu = args.mtu,
        "interface ready"
    );
    Ok(iface)
}

async fn server(args: ServerArgs) -> Result<()> {
    let iface = Arc::new(provision(&args.interface, args.address)?);
    let socket = Arc::new(
        UdpSocket::bind(args.listen)
            .await
            .with_context(|| format!("binding {}", args.listen))?,
    );
    let capacity = args.interface.capacity();
    let token = args.interface.token.clone().into_bytes();
    info!(listen = %args.listen, "waiting for peers");

    let serve = async {
        // one session at a time; a failed session frees the gate for the next peer
        while !iface.is_closed() {
            let gate = HandshakeGate::new(token.clone());
            let session = match gate.open(iface.clone(), socket.clone(), capacity).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "admission failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let _ = session.wait().await;
        }
    };

    tokio::select! {
        _ = serve => {}
        _ = shutdown_signal() => info!("shutting down"),
    }
    iface.close().ok();
    Ok(())
}

async fn client(args: ClientArgs) -> Result<()> {
    let iface = Arc::new(provision(&args.interface, args.address)?);
    let socket = Arc::new(
        UdpSocket::bind(args.bind)
            .await
            .with_context(|| format!("binding {}", args.bind))?,
    );

    socket
        .send_to(args.interface.token.as_bytes(), args.server)
        .await
        .with_context(|| format!("sending admission token to {}", args.server))?;
    info!(server = %args.server, "admission token sent");

    let session = RelayEndpoint::new(iface.clone(), socket, args.server)
        .with_capacity(args.interface.capacity())
        .spawn();

    let result = tokio::select! {
        res = session.wait() => res.context("relay session failed"),
        _ = shutdown_signal() => {
            info!("shutting down");
            Ok(())
        }
    };
    iface.close().ok();
    result
}

async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
