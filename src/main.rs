use clap::Parser;
use sqlzone::dns::enums::ResponseCode;
use sqlzone::{DNSPacket, Handler, HandlerChain, setup};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve DNS zones from a SQLite records table", long_about = None)]
struct Args {
    /// File holding the plugin block, e.g. `sqlite3 { dsn zones.db }`
    #[arg(short, long)]
    config: PathBuf,

    /// UDP address to answer queries on
    #[arg(short, long, default_value = "127.0.0.1:1053")]
    listen: SocketAddr,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let block = tokio::fs::read_to_string(&args.config).await?;
    let mut chain = HandlerChain::new();
    setup(&block, &mut chain).await?;
    let handler: Arc<dyn Handler> = Arc::from(chain.build());

    let sock = Arc::new(UdpSocket::bind(args.listen).await?);
    info!("Listening on {}", args.listen);

    // Pre-allocate buffer outside loop for efficiency
    let mut buf = vec![0; 4096];

    loop {
        tokio::select! {
            received = sock.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Failed to receive datagram: {}", e);
                        continue;
                    }
                };

                let packet = match DNSPacket::parse(&buf[..read_bytes]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        debug!("Failed to parse packet from {}: {}", src_addr, e);
                        continue;
                    }
                };

                let handler = Arc::clone(&handler);
                let sock = Arc::clone(&sock);
                tokio::spawn(async move {
                    let response = answer(handler.as_ref(), &packet).await;
                    match response.serialize_udp() {
                        Ok(serialized) => {
                            if let Err(e) = sock.send_to(&serialized, src_addr).await {
                                warn!("Failed to send response to {}: {}", src_addr, e);
                            }
                        }
                        Err(e) => error!("Failed to serialize response: {}", e),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    handler.shutdown().await;
    Ok(())
}

/// Run `query` through the chain. Unanswered queries are refused.
async fn answer(handler: &dyn Handler, query: &DNSPacket) -> DNSPacket {
    match handler.serve_dns(query).await {
        Ok(Some(response)) => response,
        Ok(None) => query.response(ResponseCode::Refused),
        Err(e) => {
            error!("Handler {} failed: {}", handler.name(), e);
            query.response(ResponseCode::ServerFailure)
        }
    }
}
