//! Command-line client for the gateway.
//!
//! `write`, `block`, and `minute` map one-to-one onto the wire
//! protocol; `flood` drives a synthetic mixed workload for soak
//! testing. Any well-formed response exits zero; only connection or
//! argument failures exit nonzero.

mod flood;

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpStream;

use oc_core::{Big256, Block, MAX_CHUNK_LEN};
use oc_wire::{read_message, write_message, Message};

#[derive(Parser)]
#[command(name = "oc-client", about = "Talk to an opalchain gateway")]
struct Cli {
    /// Gateway host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Gateway read port.
    #[arg(long, default_value_t = 9000)]
    read_port: u16,

    /// Gateway write port.
    #[arg(long, default_value_t = 9010)]
    write_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a UTF-8 chunk to the ledger.
    Write {
        /// Payload; anything past the 65535-byte limit is truncated.
        text: String,
    },

    /// Fetch a block by its hash.
    Block {
        /// Block hash, 64 hex digits.
        hash: String,
    },

    /// List the blocks created within one UTC minute.
    Minute {
        /// Any UNIX second inside the minute.
        timestamp: u64,
    },

    /// Run a synthetic read/write workload until interrupted.
    Flood(flood::FloodArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Command::Write { text } => {
            let addr = resolve(&cli.host, cli.write_port)?;
            let mut data = text.into_bytes();
            data.truncate(MAX_CHUNK_LEN);
            let accepted = submit_chunk(addr, data).await?;
            println!("accepted: {accepted}");
        }
        Command::Block { hash } => {
            let addr = resolve(&cli.host, cli.read_port)?;
            let hash = Big256::from_hex(&hash).map_err(|err| anyhow!("bad hash: {err}"))?;
            match fetch_block(addr, hash).await? {
                Some(block) => print_block(&block),
                None => println!("not found"),
            }
        }
        Command::Minute { timestamp } => {
            let addr = resolve(&cli.host, cli.read_port)?;
            let blocks = fetch_minute(addr, timestamp).await?;
            println!("{} block(s)", blocks.len());
            for block in &blocks {
                print_block(block);
            }
        }
        Command::Flood(args) => {
            let read_addr = resolve(&cli.host, cli.read_port)?;
            let write_addr = resolve(&cli.host, cli.write_port)?;
            flood::run(read_addr, write_addr, args).await?;
        }
    }

    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("no address for {host}:{port}"))
}

async fn request(addr: SocketAddr, message: Message) -> Result<Message> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;
    write_message(&mut stream, &message)
        .await
        .context("request failed")?;
    read_message(&mut stream).await.context("response failed")
}

async fn submit_chunk(addr: SocketAddr, data: Vec<u8>) -> Result<bool> {
    match request(addr, Message::WriteChunk { data }).await? {
        Message::WriteChunkResponse { accepted } => Ok(accepted),
        other => Err(anyhow!("unexpected response opcode 0x{:02x}", other.opcode())),
    }
}

async fn fetch_block(addr: SocketAddr, hash: Big256) -> Result<Option<Block>> {
    match request(addr, Message::GetBlockByHash { hash }).await? {
        Message::GetBlockByHashResponse { block } => Ok(block),
        other => Err(anyhow!("unexpected response opcode 0x{:02x}", other.opcode())),
    }
}

async fn fetch_minute(addr: SocketAddr, timestamp: u64) -> Result<Vec<Block>> {
    match request(addr, Message::ReadBlocksInMinute { timestamp }).await? {
        Message::ReadBlocksInMinuteResponse { blocks, .. } => Ok(blocks),
        other => Err(anyhow!("unexpected response opcode 0x{:02x}", other.opcode())),
    }
}

fn print_block(block: &Block) {
    println!("block {}", block.hash());
    println!("  previous  {}", block.previous_hash());
    println!("  timestamp {}", block.timestamp());
    println!("  entries   {}", block.entry_count());
    for (index, chunk) in block.entries().enumerate() {
        println!("  [{index}] {}", String::from_utf8_lossy(chunk.data()));
    }
}
