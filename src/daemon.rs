//! Top-level measurement loop.
//!
//! Runs one measurement cycle across all configured interfaces, renders and
//! writes the bird config, optionally triggers the reload command, then
//! sleeps until the next cycle. Interfaces are tested one at a time, each
//! with its own short-lived device-bound socket, so per-cycle failures stay
//! contained to one peer. An interrupt ends the loop cleanly.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use crate::{
    bird,
    configuration::Configuration,
    crypto::Psk,
    prober::{ProbeError, Prober},
    resolver::{InterfaceResolver, PeerResolver},
    responder::Responder,
    stats::TestResult,
};

/// Runs the daemon until interrupted.
///
/// # Errors
/// Only startup failures (responder socket bind) propagate; per-cycle
/// probing, rendering and reload errors are logged and retried next cycle.
pub async fn run(conf: Configuration, psk: Psk) -> std::io::Result<()> {
    if conf.responder {
        let socket = UdpSocket::bind((conf.listen_addr, conf.listen_port)).await?;
        info!("responder listening on {}", socket.local_addr()?);
        let responder = Responder::new(psk.clone());
        tokio::spawn(async move {
            if let Err(e) = responder.run(socket).await {
                error!("responder terminated: {}", e);
            }
        });
    }

    if conf.interfaces.is_empty() {
        // responder-only deployment: park until interrupted
        tokio::signal::ctrl_c().await?;
        info!("exit on interrupt");
        return Ok(());
    }

    let resolver = InterfaceResolver;
    let mut results: BTreeMap<String, Option<TestResult>> = conf
        .interfaces
        .iter()
        .map(|ifname| (ifname.clone(), None))
        .collect();

    loop {
        run_cycle(&conf, &psk, &resolver, &mut results).await;

        let contents = bird::render(&results);
        if let Err(e) = bird::write_config(&conf.bird_output, &contents) {
            warn!(
                "failed to write {}: {}",
                conf.bird_output.display(),
                e
            );
        } else if let Some(ref cmd) = conf.bird_reload_cmd {
            let words: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
            match bird::reload(&words).await {
                Ok(()) => debug!("bird reloaded"),
                Err(e) => warn!("bird reload failed: {}", e),
            }
        }

        if conf.oneshot {
            match serde_json::to_string_pretty(&results) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("failed to serialize results: {}", e),
            }
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(conf.test_interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("exit on interrupt");
                return Ok(());
            }
        }
    }
}

/// Tests every configured interface once, updating `results` in place.
///
/// A missing peer address or a failed cycle records `None` for that
/// interface; the next cycle re-resolves and retries from scratch.
async fn run_cycle<R: PeerResolver>(
    conf: &Configuration,
    psk: &Psk,
    resolver: &R,
    results: &mut BTreeMap<String, Option<TestResult>>,
) {
    for ifname in &conf.interfaces {
        let Some(addr) = resolve_peer(conf, resolver, ifname) else {
            warn!("no peer address for {}, skipping", ifname);
            results.insert(ifname.clone(), None);
            continue;
        };
        let peer = SocketAddr::new(addr, conf.peer_port);

        match test_interface(conf, psk, ifname, peer).await {
            Ok(result) => {
                info!("stat on {} updated: {}", ifname, result);
                results.insert(ifname.clone(), Some(result));
            }
            Err(err) => {
                warn!("fail to test {}: {}", ifname, err);
                results.insert(ifname.clone(), None);
            }
        }
    }
}

/// Picks the probe target for `ifname`: an explicit `--peer` override wins
/// over the interface's own destination-address lookup.
fn resolve_peer<R: PeerResolver>(
    conf: &Configuration,
    resolver: &R,
    ifname: &str,
) -> Option<IpAddr> {
    conf.peer_override(ifname)
        .or_else(|| resolver.peer_addr(ifname))
}

async fn test_interface(
    conf: &Configuration,
    psk: &Psk,
    ifname: &str,
    peer: SocketAddr,
) -> Result<TestResult, ProbeError> {
    let mut prober = Prober::connect(psk.clone(), peer, Some(ifname))
        .await?
        .with_base_timeout(Duration::from_secs(conf.stat_timeout));
    prober
        .perform_test(conf.count, Duration::from_millis(conf.ping_interval_ms))
        .await
}
