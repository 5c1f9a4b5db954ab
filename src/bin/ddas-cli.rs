//! DDAS CLI - duplicate download alerts from the terminal
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode: queue files, answer consent requests
//! ./target/debug/ddas-cli
//!
//! # Accept everything, JSON lines for scripting
//! ./target/debug/ddas-cli --auto-accept --json
//!
//! # One-shot queries
//! ./target/debug/ddas-cli --health
//! ./target/debug/ddas-cli --history --json | jq .
//! ./target/debug/ddas-cli --pending
//! ```

use anyhow::Result;
use clap::Parser;

use ddas_lib::cli::{initialize, print_history, print_pending, run_event_loop, run_repl, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut ctx = initialize(&args).await?;

    if args.is_one_shot() {
        let result = if args.health {
            let connected = ctx.orchestrator.probe().await;
            println!(
                "{}",
                if args.json {
                    serde_json::json!({ "connected": connected }).to_string()
                } else if connected {
                    "reachable".to_string()
                } else {
                    "unreachable".to_string()
                }
            );
            if connected {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "Processing service at {} is unreachable",
                    ctx.settings.service.base_url
                ))
            }
        } else if args.history {
            print_history(&ctx.orchestrator.history().await, args.json)
        } else {
            let pending = ctx.orchestrator.load_pending().await?;
            print_pending(&pending, args.json)
        };

        ctx.shutdown().await?;
        return result;
    }

    let output = ctx
        .event_rx
        .take()
        .map(|event_rx| tokio::spawn(run_event_loop(event_rx, args.json)));

    ctx.orchestrator.start().await?;
    let result = run_repl(&mut ctx).await;

    ctx.shutdown().await?;
    if let Some(output) = output {
        output.abort();
    }

    result
}
