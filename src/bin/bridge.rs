use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use bridgekit::config::BridgeArgs;
use bridgekit::signal_fanout::SignalFanout;
use bridgekit::{bridge, BridgeError};

fn main() -> ExitCode {
    let args = BridgeArgs::parse();

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    builder.init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: BridgeArgs) -> anyhow::Result<ExitCode> {
    args.validate().context("invalid configuration")?;

    let ctx = zmq::Context::new();
    let _fanout = SignalFanout::spawn(ctx.clone()).context("failed to start signal fanout")?;

    let worker_ctx = ctx.clone();
    let worker = std::thread::Builder::new()
        .name("bridge".into())
        .spawn(move || bridge::run(worker_ctx, &args))
        .context("failed to spawn bridge worker thread")?;

    match worker.join() {
        // Both graceful (`exit`) and interrupted (`terminate`) shutdowns
        // exit 0 — only a genuine error produces a nonzero status (spec §6).
        Ok(Ok(_graceful)) => Ok(ExitCode::SUCCESS),
        Ok(Err(e)) => {
            log::error!("bridge failed: {e}");
            Ok(exit_code_for(&e))
        }
        Err(_) => anyhow::bail!("bridge worker thread panicked"),
    }
}

fn exit_code_for(e: &BridgeError) -> ExitCode {
    match e {
        BridgeError::Config(_) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
