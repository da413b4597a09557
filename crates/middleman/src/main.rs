//! `middleman [CONFIG]`: runs the proxy described by a JSON configuration file.
//!
//! The configuration defaults to `mm_config.json` in the working directory. The
//! proxy runs until stdin is closed; typing `stats` prints the counters.

use std::{
    env,
    io::{self, BufRead},
    path::PathBuf,
    process::ExitCode,
    thread,
};

use middleman_core::{
    config::load_config,
    constants::DEFAULT_CONFIG_FILE,
    error::Result,
    mutator::{PacketMutator, PassThroughMutator},
};
use middleman_host::{ChannelObserver, Proxy};
use middleman_protocol::RuleBasedMutator;
use middleman_utilities::format_ip;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("middleman=info,info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_level(true).init();
}

fn run() -> Result<()> {
    let path = env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
    let config = load_config(&path)?;

    let mutator: Box<dyn PacketMutator> = match RuleBasedMutator::from_config(&config)? {
        Some(mutator) => {
            if !mutator.diagnostics().is_empty() {
                warn!("{} schema/rule elements were dropped", mutator.diagnostics().len());
            }
            Box::new(mutator)
        }
        None => {
            info!("no schema configured, forwarding unchanged");
            Box::new(PassThroughMutator)
        }
    };

    let (observer, packets) = ChannelObserver::channel();
    let mut proxy = Proxy::bind_with_mutator_and_observer(&config, mutator, Box::new(observer))?;

    let viewer = thread::spawn(move || {
        for packet in packets {
            debug!(
                "{} -> {}: {} bytes{}",
                format_ip(&packet.source),
                format_ip(&packet.destination),
                packet.payload().len(),
                if packet.mutated { " (mutated)" } else { "" }
            );
        }
    });

    for line in io::stdin().lock().lines() {
        match line?.trim() {
            "stats" => info!("{:?}", proxy.statistics()),
            "quit" | "exit" => break,
            "" => {}
            other => warn!("unknown command {:?}", other),
        }
    }

    proxy.stop();
    info!("final statistics: {:?}", proxy.statistics());
    drop(proxy);
    if viewer.join().is_err() {
        error!("viewer thread panicked");
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
