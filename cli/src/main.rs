//! chainbalance CLI — run read-only calls across a pool of RPC nodes.
//!
//! Usage:
//! ```bash
//! # Round-robin eth_blockNumber across two nodes
//! chainbalance probe --url https://cloudflare-eth.com --url https://eth.llamarpc.com --count 4
//!
//! # Call a view method through an ABI file
//! chainbalance call --url https://cloudflare-eth.com --abi erc20.json \
//!     --address 0x6B175474E89094C44Da98b954EedeAC495271d0F --method totalSupply
//! ```

use std::collections::HashMap;
use std::env;
use std::process;
use std::time::Instant;

use anyhow::{bail, Context};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use chainbalance_core::{Dispatcher, DispatcherConfig, InvokeOptions, TransportError};
use chainbalance_http::{build_endpoints, ContractInfo, HttpClientConfig, RpcTransport};

const TARGET: &str = "target";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "probe" => cmd_probe(&args[2..]).await,
        "call" => cmd_call(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainbalance {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainbalance {}", env!("CARGO_PKG_VERSION"));
    println!("Spread read-only blockchain RPC calls across several nodes\n");
    println!("USAGE:");
    println!("    chainbalance <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    probe      Send eth_blockNumber through the pool, one node per call");
    println!("    call       Call a contract view method through the pool");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("COMMON FLAGS:");
    println!("    --url <URL>         Node URL, repeat for each node  [required]");
    println!("    --config <FILE>     Dispatcher config JSON (CHAINBALANCE_* env vars override)\n");
    println!("PROBE FLAGS:");
    println!("    --count <N>         Number of calls (default: number of nodes)\n");
    println!("CALL FLAGS:");
    println!("    --abi <FILE>        Contract ABI JSON  [required]");
    println!("    --address <ADDR>    Contract address  [required]");
    println!("    --method <NAME>     Method name  [required]");
    println!("    --args <JSON>       Method arguments as a JSON array");
    println!("    --block <TAG>       Block tag or number (default: latest)");
}

async fn cmd_probe(args: &[String]) -> anyhow::Result<()> {
    let urls = parse_urls(args)?;
    let count = match parse_flag(args, "--count") {
        Some(n) => n.parse::<usize>().context("--count must be a number")?,
        None => urls.len(),
    };

    let pool = build_endpoints(&urls, &HashMap::new(), &HttpClientConfig::default())?;
    let dispatcher = Dispatcher::new(pool, load_config(args)?)?;

    for i in 0..count {
        let start = Instant::now();
        let (url, block) = dispatcher
            .invoke_client(
                |client| async move {
                    let block = client.request("eth_blockNumber", vec![]).await?;
                    Ok::<_, TransportError>((client.url().to_string(), block))
                },
                InvokeOptions::default(),
            )
            .await?;

        let hex = block.as_str().unwrap_or_default();
        let number = u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(0);
        println!(
            "  #{i:<3} {url}  block {number} ({hex})  {}ms",
            start.elapsed().as_millis()
        );
    }

    println!("\nWindow stats:");
    for (url, state) in urls.iter().zip(dispatcher.stats_snapshot()) {
        println!("  {url}  {} request(s) in current window", state.access_count);
    }
    Ok(())
}

async fn cmd_call(args: &[String]) -> anyhow::Result<()> {
    let urls = parse_urls(args)?;
    let abi_path = parse_flag(args, "--abi").context("--abi is required")?;
    let address = parse_flag(args, "--address").context("--address is required")?;
    let method = parse_flag(args, "--method").context("--method is required")?;

    let abi: Value = serde_json::from_str(
        &std::fs::read_to_string(&abi_path).with_context(|| format!("reading {abi_path}"))?,
    )
    .with_context(|| format!("parsing {abi_path}"))?;
    let method_args: Vec<Value> = match parse_flag(args, "--args") {
        Some(raw) => serde_json::from_str(&raw).context("--args must be a JSON array")?,
        None => Vec::new(),
    };
    let call_args = parse_flag(args, "--block").map(|b| serde_json::json!({ "block": b }));

    let contracts = HashMap::from([(TARGET.to_string(), ContractInfo::new(abi, address))]);
    let pool = build_endpoints(&urls, &contracts, &HttpClientConfig::default())?;
    let dispatcher = Dispatcher::new(pool, load_config(args)?)?;
    tracing::debug!(nodes = urls.len(), %method, args = method_args.len(), "dispatching call");

    let out = dispatcher
        .invoke_method(
            TARGET,
            &method,
            Some(method_args.as_slice()),
            call_args.as_ref(),
            InvokeOptions::default(),
        )
        .await?;

    match out {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => bail!("method '{method}' not found in {abi_path}"),
    }
    Ok(())
}

fn load_config(args: &[String]) -> anyhow::Result<DispatcherConfig> {
    let config = match parse_flag(args, "--config") {
        Some(path) => DispatcherConfig::from_json_file(&path)?,
        None => DispatcherConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn parse_urls(args: &[String]) -> anyhow::Result<Vec<String>> {
    let urls = parse_all(args, "--url");
    if urls.is_empty() {
        bail!("at least one --url is required");
    }
    Ok(urls)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_all(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}
