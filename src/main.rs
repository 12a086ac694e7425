use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use crate::bencoding::Value;
use crate::client::{Client, Config};
use crate::peer::{ChokeState, PeerSession};
use crate::torrent::Torrent;

mod bencoding;
mod client;
mod codec;
mod core;
mod crypto;
mod error;
mod message;
mod peer;
#[cfg(test)]
mod testing;
mod torrent;
mod tracker;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode { value: String },
    /// Print the metadata of a torrent file
    Info { torrent: PathBuf },
    /// List the peers the tracker returns for a torrent
    Peers { torrent: PathBuf },
    /// Perform a handshake with a peer and print its id
    Handshake { torrent: PathBuf, peer: SocketAddr },
    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        piece: usize,
    },
    /// Download the whole file
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
    },
}

async fn load_torrent(path: &Path) -> anyhow::Result<Torrent> {
    Torrent::load(path)
        .await
        .with_context(|| format!("unable to load torrent {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let client = Client::new(Config::default());
    match cli.command {
        Command::Decode { value } => {
            let value = Value::from_bytes(value.as_bytes())?;
            println!("{}", value.to_json());
        }
        Command::Info { torrent } => {
            let torrent = load_torrent(&torrent).await?;
            println!("Tracker URL: {}", torrent.announce);
            println!("Length: {}", torrent.info.length);
            println!("Info Hash: {}", torrent.info.info_hash);
            println!("Piece Length: {}", torrent.info.piece_length);
            println!("Piece Hashes:");
            for hash in &torrent.info.pieces {
                println!("{}", hash);
            }
        }
        Command::Peers { torrent } => {
            let torrent = load_torrent(&torrent).await?;
            for peer in client.discover_peers(&torrent).await? {
                println!("{}", peer);
            }
        }
        Command::Handshake { torrent, peer } => {
            let torrent = load_torrent(&torrent).await?;
            let session = PeerSession::connect(peer, &torrent.info, client.config()).await?;
            println!("Peer ID: {}", session.peer_id().to_hex());
            let choke = match session.choke_state() {
                ChokeState::Choked => "choked",
                ChokeState::Unchoked => "unchoked",
            };
            info!(
                "[{}] advertises {} of {} pieces, {}",
                session.address(),
                session.available_pieces().len(),
                torrent.info.total_pieces(),
                choke
            );
            session.close().await;
        }
        Command::DownloadPiece {
            output,
            torrent,
            piece,
        } => {
            let torrent = load_torrent(&torrent).await?;
            let data = client.download_piece(&torrent, piece).await?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("unable to write {}", output.display()))?;
            info!("piece {} written to {}", piece, output.display());
        }
        Command::Download { output, torrent } => {
            let torrent = load_torrent(&torrent).await?;
            let data = client.download(&torrent).await?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("unable to write {}", output.display()))?;
            info!("{} written to {}", torrent.info.name, output.display());
        }
    }

    Ok(())
}
