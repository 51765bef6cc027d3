//! bigmsg-ctl: send or receive one large buffer over TCP in capped chunks.

mod cmd;

use anyhow::{Context, Result, bail};

use crate::cmd::{Framing, Options};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  bigmsg-ctl send <addr> <file> [options]      Connect to <addr> and send <file>");
    eprintln!("  bigmsg-ctl recv <listen-addr> <file> [options]  Accept one peer and write to <file>");
    eprintln!("  bigmsg-ctl plan <length> [--chunk-size N]    Print the chunk layout for <length>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --tag N          Message tag (default 0)");
    eprintln!("  --rank N         Local endpoint (default 0 for send, 1 for recv)");
    eprintln!("  --peer N         Remote endpoint (default 1 for send, 0 for recv)");
    eprintln!("  --chunk-size N   Largest message in bytes (default BIGMSG_MAX_CHUNK_SIZE or 1 GiB)");
    eprintln!("  --digest         Send a SHA-256 of the payload in the header");
    eprintln!("  --in-place       Carry the chunk count in the first 8 bytes of the buffer");
    eprintln!("  --len N          Expected length (required by recv --in-place)");
    eprintln!();
    eprintln!("Environment: BIGMSG_MAX_CHUNK_SIZE, BIGMSG_DIGEST, BIGMSG_VERIFY_DIGEST,");
    eprintln!("             BIGMSG_MAX_TOTAL_LEN, RUST_LOG (also read from .env)");
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T> {
    args.get(i)
        .with_context(|| format!("{} requires a value", flag))?
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number", flag))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigmsg=info,bigmsg_ctl=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut opts = Options::default();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--tag" => {
                i += 1;
                opts.tag = Some(parse_value(&args, i, "--tag")?);
            }
            "--rank" => {
                i += 1;
                opts.rank = Some(parse_value(&args, i, "--rank")?);
            }
            "--peer" => {
                i += 1;
                opts.peer = Some(parse_value(&args, i, "--peer")?);
            }
            "--chunk-size" => {
                i += 1;
                opts.chunk_size = Some(parse_value(&args, i, "--chunk-size")?);
            }
            "--len" => {
                i += 1;
                opts.len = Some(parse_value(&args, i, "--len")?);
            }
            "--digest" => opts.digest = true,
            "--in-place" => opts.framing = Framing::InPlace,
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["send", addr, file] => cmd::send(addr, file, &opts),
        ["recv", addr, file] => cmd::recv(addr, file, &opts),
        ["plan", len] => cmd::plan(len, &opts),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            bail!("invalid arguments");
        }
    }
}
