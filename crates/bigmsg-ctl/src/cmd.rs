use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use bigmsg::{
    ChunkPlan, Endpoint, Tag, TcpTransport, TracingLogger, TransferConfig, recv_big_in_place,
    recv_big_vec, send_big, send_big_in_place,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    #[default]
    Header,
    InPlace,
}

#[derive(Debug, Default)]
pub struct Options {
    pub tag: Option<i32>,
    pub rank: Option<u32>,
    pub peer: Option<u32>,
    pub chunk_size: Option<usize>,
    pub len: Option<usize>,
    pub digest: bool,
    pub framing: Framing,
}

#[derive(Serialize)]
struct TransferOutput {
    transfer_id: String,
    peer: u32,
    tag: i32,
    bytes: u64,
    chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    digest_verified: bool,
    duration_ms: u64,
}

#[derive(Serialize)]
struct PlanOutput {
    length: usize,
    chunk_size: usize,
    chunk_count: u64,
    chunks: Vec<PlanChunk>,
}

#[derive(Serialize)]
struct PlanChunk {
    index: u64,
    offset: usize,
    len: usize,
}

/// Env config with command-line overrides applied.
fn transfer_config(opts: &Options) -> Result<TransferConfig> {
    let mut config = TransferConfig::from_env().context("invalid BIGMSG_* environment")?;
    if let Some(size) = opts.chunk_size {
        if size == 0 {
            bail!("--chunk-size must be non-zero");
        }
        config.max_chunk_size = size;
    }
    if opts.digest {
        config.digest = true;
    }
    Ok(config.with_logger(Arc::new(TracingLogger)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn send(addr: &str, file: &str, opts: &Options) -> Result<()> {
    let addr: SocketAddr = addr.parse().with_context(|| format!("bad address {}", addr))?;
    let config = transfer_config(opts)?;
    let rank = Endpoint(opts.rank.unwrap_or(0));
    let peer = Endpoint(opts.peer.unwrap_or(1));
    let tag = Tag(opts.tag.unwrap_or(0));

    let mut data = std::fs::read(file).with_context(|| format!("cannot read {}", file))?;
    info!("Sending {} ({} bytes) to {} at {}", file, data.len(), peer, addr);

    let mut transport = TcpTransport::new(rank);
    transport
        .connect(peer, addr)
        .with_context(|| format!("cannot connect to {}", addr))?;

    let report = match opts.framing {
        Framing::Header => send_big(&mut transport, &data, peer, tag, &config)?,
        Framing::InPlace => send_big_in_place(&mut transport, &mut data, peer, tag, &config)?,
    };

    print_json(&TransferOutput {
        transfer_id: hex::encode(report.transfer_id),
        peer: peer.0,
        tag: tag.0,
        bytes: report.total_bytes,
        chunks: report.chunk_count,
        digest: report.digest.map(hex::encode),
        digest_verified: false,
        duration_ms: report.duration_ms,
    })
}

pub fn recv(addr: &str, file: &str, opts: &Options) -> Result<()> {
    let addr: SocketAddr = addr.parse().with_context(|| format!("bad address {}", addr))?;
    let config = transfer_config(opts)?;
    let rank = Endpoint(opts.rank.unwrap_or(1));
    let expected_peer = Endpoint(opts.peer.unwrap_or(0));
    let tag = Tag(opts.tag.unwrap_or(0));

    let listener = TcpTransport::bind(addr).with_context(|| format!("cannot bind {}", addr))?;
    info!("Listening on {} as {}", listener.local_addr()?, rank);

    let mut transport = TcpTransport::new(rank);
    let peer = transport.accept(&listener)?;
    if peer != expected_peer {
        bail!("peer introduced itself as {}, expected {}", peer, expected_peer);
    }

    let (data, report) = match opts.framing {
        Framing::Header => recv_big_vec(&mut transport, peer, tag, &config)?,
        Framing::InPlace => {
            let len = opts.len.context("recv --in-place requires --len")?;
            let mut buf = vec![0u8; len];
            let report = recv_big_in_place(&mut transport, &mut buf, peer, tag, &config)?;
            (buf, report)
        }
    };

    write_output(Path::new(file), &data)?;
    info!("Wrote {} bytes to {}", data.len(), file);

    print_json(&TransferOutput {
        transfer_id: hex::encode(report.transfer_id),
        peer: peer.0,
        tag: tag.0,
        bytes: report.total_bytes,
        chunks: report.chunk_count,
        digest: None,
        digest_verified: report.digest_verified,
        duration_ms: report.duration_ms,
    })
}

pub fn plan(len: &str, opts: &Options) -> Result<()> {
    let length: usize = len.parse().context("<length> must be a number")?;
    let chunk_size = match opts.chunk_size {
        Some(size) => size,
        None => TransferConfig::from_env()?.max_chunk_size,
    };
    print_json(&plan_output(length, chunk_size)?)
}

fn plan_output(length: usize, chunk_size: usize) -> Result<PlanOutput> {
    let plan = ChunkPlan::new(length, chunk_size)?;
    Ok(PlanOutput {
        length,
        chunk_size,
        chunk_count: plan.count(),
        chunks: plan
            .iter()
            .map(|(index, range)| PlanChunk {
                index,
                offset: range.start,
                len: range.len(),
            })
            .collect(),
    })
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_matches_layout() {
        let out = plan_output(25, 10).unwrap();
        assert_eq!(out.chunk_count, 3);
        let lens: Vec<usize> = out.chunks.iter().map(|c| c.len).collect();
        assert_eq!(lens, vec![10, 10, 5]);
        assert_eq!(out.chunks[2].offset, 20);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["chunk_count"], 3);
    }

    #[test]
    fn plan_exact_multiple() {
        let out = plan_output(20, 10).unwrap();
        let lens: Vec<usize> = out.chunks.iter().map(|c| c.len).collect();
        assert_eq!(lens, vec![10, 10]);
    }

    #[test]
    fn plan_zero_chunk_size_fails() {
        assert!(plan_output(20, 0).is_err());
    }
}
