//! Synthetic load generation.
//!
//! A pool of writers submits random chunks and a pool of readers
//! issues minute queries, each worker sleeping a jittered delay
//! between requests. Runs until interrupted.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Args;
use rand::Rng;
use tokio::net::TcpStream;
use tracing::{info, warn};

use oc_wire::{read_message, write_message, Message};

/// Workload shape.
#[derive(Args, Debug, Clone)]
pub struct FloodArgs {
    /// Concurrent chunk writers.
    #[arg(long, default_value_t = 4)]
    pub writers: usize,

    /// Shortest pause between writes, milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub writer_delay_ms_min: u64,

    /// Longest pause between writes, milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub writer_delay_ms_max: u64,

    /// Concurrent minute readers.
    #[arg(long, default_value_t = 4)]
    pub readers: usize,

    /// Shortest pause between reads, milliseconds.
    #[arg(long, default_value_t = 4000)]
    pub reader_delay_ms_min: u64,

    /// Longest pause between reads, milliseconds.
    #[arg(long, default_value_t = 8000)]
    pub reader_delay_ms_max: u64,

    /// Upper bound on the initial reader stagger, milliseconds.
    #[arg(long, default_value_t = 8000)]
    pub reader_initial_delay_ms_max: u64,
}

/// Runs the workload until ctrl-c.
pub async fn run(read_addr: SocketAddr, write_addr: SocketAddr, args: FloodArgs) -> Result<()> {
    info!(
        writers = args.writers,
        readers = args.readers,
        "flood starting, ctrl-c to stop"
    );

    let mut tasks = Vec::new();
    for id in 0..args.writers {
        let range = args.writer_delay_ms_min..=args.writer_delay_ms_max.max(args.writer_delay_ms_min);
        tasks.push(tokio::spawn(writer_loop(id, write_addr, range)));
    }
    for id in 0..args.readers {
        let range = args.reader_delay_ms_min..=args.reader_delay_ms_max.max(args.reader_delay_ms_min);
        let initial = args.reader_initial_delay_ms_max;
        tasks.push(tokio::spawn(reader_loop(id, read_addr, range, initial)));
    }

    tokio::signal::ctrl_c().await?;
    info!("flood stopping");
    for task in &tasks {
        task.abort();
    }
    Ok(())
}

async fn writer_loop(id: usize, addr: SocketAddr, delay_ms: std::ops::RangeInclusive<u64>) {
    let mut sequence = 0u64;
    let mut accepted_count = 0u64;
    let mut rejected_count = 0u64;

    loop {
        let pause = rand::thread_rng().gen_range(delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(pause)).await;

        sequence += 1;
        let payload = format!("flood-{id}-{sequence}-{:08x}", rand::thread_rng().gen::<u32>());
        match exchange(addr, Message::WriteChunk { data: payload.into_bytes() }).await {
            Ok(Message::WriteChunkResponse { accepted }) => {
                if accepted {
                    accepted_count += 1;
                } else {
                    rejected_count += 1;
                }
                if sequence % 16 == 0 {
                    info!(writer = id, accepted_count, rejected_count, "writer progress");
                }
            }
            Ok(other) => warn!(writer = id, opcode = other.opcode(), "unexpected response"),
            Err(err) => warn!(writer = id, %err, "write failed"),
        }
    }
}

async fn reader_loop(
    id: usize,
    addr: SocketAddr,
    delay_ms: std::ops::RangeInclusive<u64>,
    initial_delay_ms_max: u64,
) {
    if initial_delay_ms_max > 0 {
        let stagger = rand::thread_rng().gen_range(0..=initial_delay_ms_max);
        tokio::time::sleep(Duration::from_millis(stagger)).await;
    }

    loop {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // Query the previous minute; the current one is still filling.
        match exchange(addr, Message::ReadBlocksInMinute { timestamp: now.saturating_sub(60) }).await
        {
            Ok(Message::ReadBlocksInMinuteResponse { blocks, .. }) => {
                info!(reader = id, blocks = blocks.len(), "minute read");
            }
            Ok(other) => warn!(reader = id, opcode = other.opcode(), "unexpected response"),
            Err(err) => warn!(reader = id, %err, "read failed"),
        }

        let pause = rand::thread_rng().gen_range(delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

async fn exchange(addr: SocketAddr, message: Message) -> Result<Message> {
    let mut stream = TcpStream::connect(addr).await?;
    write_message(&mut stream, &message).await?;
    Ok(read_message(&mut stream).await?)
}
