mod shared;

use std::sync::Arc;

use clap::Parser;
use smol::Executor;

use hyphae_core::crypto::{KeyPair, KeyPairType};
use hyphae_net::{transports::tcp::TcpTransport, Endpoint};
use hyphae_p2p::{stream_handler, Config, MuxStream, PeerID, PeerInfo, Swarm};

use shared::{read_line_async, run_executor};

const CHAT_PROTO: &str = "/chat/1.0";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Endpoint for accepting incoming connections, e.g. tcp://127.0.0.1:4000.
    #[arg(short)]
    listen_endpoint: Option<Endpoint>,

    /// Endpoint of a peer to chat with.
    #[arg(short)]
    peer_endpoint: Option<Endpoint>,

    /// Peer id of the peer to chat with (full hex, printed by that peer
    /// on startup).
    #[arg(long)]
    peer_id: Option<PeerID>,

    /// Username shown to the remote side.
    #[arg(long)]
    username: String,
}

async fn pump_stream(stream: MuxStream) -> hyphae_p2p::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => return Ok(()),
        };
        print!("{}", String::from_utf8_lossy(&buf[..n]));
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let key_pair = KeyPair::generate(&KeyPairType::Ed25519);

    let ex = Arc::new(Executor::new());
    run_executor(
        async {
            let swarm = Swarm::new(
                key_pair,
                Arc::new(TcpTransport),
                Config::default(),
                ex.clone(),
            )
            .await;

            println!("local peer id: {}", swarm.local_peer_id().to_hex());

            swarm
                .set_stream_handler(CHAT_PROTO.to_string(), stream_handler(pump_stream))
                .await;

            if let Some(endpoint) = &cli.listen_endpoint {
                let resolved = swarm.listen(endpoint).await.expect("start listening");
                println!("listening on {resolved}");
            }

            let outgoing = match (&cli.peer_endpoint, &cli.peer_id) {
                (Some(endpoint), Some(peer_id)) => {
                    let info = PeerInfo::new(peer_id.clone(), vec![endpoint.clone()]);
                    swarm.connect(&info).await.expect("connect to peer");
                    let stream = swarm
                        .new_stream(peer_id, &[CHAT_PROTO.to_string()])
                        .await
                        .expect("open chat stream");
                    println!("connected to {peer_id}");
                    Some(stream)
                }
                (Some(_), None) | (None, Some(_)) => {
                    eprintln!("both -p and --peer-id are required to connect");
                    return;
                }
                (None, None) => None,
            };

            loop {
                let line = match read_line_async().await {
                    Ok(line) if !line.is_empty() => line,
                    _ => break,
                };
                if let Some(stream) = &outgoing {
                    let msg = format!("{}> {line}", cli.username);
                    if stream.write(msg.as_bytes()).await.is_err() {
                        eprintln!("peer went away");
                        break;
                    }
                }
            }

            swarm.close().await.expect("close swarm");
        },
        ex.clone(),
    );
}
