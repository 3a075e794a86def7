//! netloc-trapd: receive SNMP traps and informs and log them.

use std::process::ExitCode;

use clap::Parser;
use netloc::cli::args::TrapdArgs;
use netloc::manager::Received;
use netloc::{ExecutionContext, TrapDispatcher};

fn log_received(received: Received) {
    let pdu = &received.pdu;
    tracing::info!(
        target: "netloc::trapd",
        { snmp.source = %received.source, snmp.version = %received.version, pdu = %pdu.pdu_type(), trap_oid = ?pdu.trap_oid().map(|o| o.to_string()) },
        "notification"
    );
    for vb in pdu.varbinds() {
        tracing::info!(target: "netloc::trapd", "  {vb}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = TrapdArgs::parse();
    args.output.init_tracing();

    let settings = match args.v3.security_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let traps = TrapDispatcher::with_config(args.dispatcher_config());
    let local = match traps.start().await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(target: "netloc::trapd", { local = %local }, "listening");

    let context = ExecutionContext::spawn("netloc-trapd");
    for &ip in &args.sources {
        let span = tracing::info_span!("source", %ip);
        if let Err(e) = traps.register(context.clone(), span, ip, &settings, log_received) {
            eprintln!("Error: {ip}: {e}");
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    // let queued callbacks finish logging
    let _ = traps.flush().await;
    let _ = context.flush().await;
    ExitCode::SUCCESS
}
