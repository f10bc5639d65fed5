#![forbid(unsafe_code)]

//! Diagnostic UDP peer for the Sotto datagram encryption engine.
//!
//! Key exchange is out of scope for the engine, so the link material is
//! passed out of band: `keygen` prints a matched pair of hex blobs, one
//! for each end, and `listen`/`send` take them as flags.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{info, warn};

use sotto_crypto::{CryptState, KEY_SIZE, NONCE_SIZE};

#[derive(Parser, Debug)]
#[command(name = "sotto-peer", about = "Encrypted UDP echo peer for link diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate link material for a new peer pair.
    Keygen,

    /// Decrypt incoming datagrams and echo them back encrypted.
    Listen {
        #[arg(long, default_value = "0.0.0.0:7500")]
        bind: String,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Encrypt messages, send them, and verify the echo.
    Send {
        #[arg(long)]
        to: String,

        /// Seconds to wait for each echo.
        #[arg(long, default_value_t = 5)]
        wait: u64,

        #[command(flatten)]
        link: LinkArgs,

        /// Messages to send, one datagram each.
        messages: Vec<String>,
    },
}

/// Out-of-band link material, hex encoded.
#[derive(Args, Debug)]
struct LinkArgs {
    /// Shared 16-byte key.
    #[arg(long, env = "SOTTO_KEY")]
    key: String,

    /// This peer's outbound counter (the remote peer's decrypt nonce).
    #[arg(long)]
    encrypt_nonce: String,

    /// This peer's inbound counter (the remote peer's encrypt nonce).
    #[arg(long)]
    decrypt_nonce: String,
}

impl LinkArgs {
    fn into_state(self) -> Result<CryptState> {
        Ok(CryptState::new(
            parse_hex::<KEY_SIZE>(&self.key).context("bad --key")?,
            parse_hex::<NONCE_SIZE>(&self.encrypt_nonce).context("bad --encrypt-nonce")?,
            parse_hex::<NONCE_SIZE>(&self.decrypt_nonce).context("bad --decrypt-nonce")?,
        ))
    }
}

fn parse_hex<const N: usize>(input: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(input).context("invalid hex")?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("expected {} bytes, got {}", N, v.len()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Keygen => keygen(),
        Command::Listen { bind, link } => listen(&bind, link.into_state()?).await,
        Command::Send {
            to,
            wait,
            link,
            messages,
        } => send(&to, wait, link.into_state()?, &messages).await,
    }
}

fn keygen() -> Result<()> {
    let state = CryptState::generate();

    println!("# listener side");
    println!("--key {}", hex::encode(state.key()));
    println!("--encrypt-nonce {}", hex::encode(state.encrypt_nonce()));
    println!("--decrypt-nonce {}", hex::encode(state.decrypt_nonce()));
    println!();
    println!("# sender side (counters swapped)");
    println!("--key {}", hex::encode(state.key()));
    println!("--encrypt-nonce {}", hex::encode(state.decrypt_nonce()));
    println!("--decrypt-nonce {}", hex::encode(state.encrypt_nonce()));
    Ok(())
}

async fn listen(bind: &str, mut state: CryptState) -> Result<()> {
    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on {}", socket.local_addr()?);

    let mut buf = vec![0u8; 65536];
    loop {
        let (len, peer) = tokio::select! {
            received = socket.recv_from(&mut buf) => received?,
            _ = tokio::signal::ctrl_c() => break,
        };

        match state.decrypt(&buf[..len]) {
            Ok(plaintext) => {
                info!(
                    %peer,
                    len = plaintext.len(),
                    "decrypted datagram, echoing back"
                );
                let reply = state.encrypt(&plaintext);
                socket.send_to(&reply, peer).await?;
            }
            Err(reason) => warn!(%peer, %reason, "rejected datagram"),
        }
    }

    info!(stats = %serde_json::to_string(&state.stats())?, "shutting down");
    Ok(())
}

async fn send(to: &str, wait: u64, mut state: CryptState, messages: &[String]) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(to).await.with_context(|| format!("cannot reach {to}"))?;

    let mut buf = vec![0u8; 65536];
    for message in messages {
        let datagram = state.encrypt(message.as_bytes());
        socket.send(&datagram).await?;

        let len = timeout(Duration::from_secs(wait), socket.recv(&mut buf))
            .await
            .context("timed out waiting for echo")??;
        match state.decrypt(&buf[..len]) {
            Ok(echoed) if echoed == message.as_bytes() => {
                info!(len = echoed.len(), "echo verified")
            }
            Ok(_) => warn!("echo decrypted but does not match what was sent"),
            Err(reason) => warn!(%reason, "echo rejected"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&state.stats())?);
    Ok(())
}
