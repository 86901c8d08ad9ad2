//! Demo WebSocket calculator server.
//!
//! The upgrade path selects the provider: `/simple` is a flat calculator,
//! `/nested` namespaces scalar and vector math under `math`. Anything
//! else is rejected.
//!
//! Run it, then drive it with calc_client:
//!   cargo run -p calc_server -- --port 9090
//!   cargo run -p calc_client -- --url ws://127.0.0.1:9090

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use farrpc::Fault;
use farrpc::Provider;
use farsock::WsServer;

fn simple() -> Provider {
    Provider::new()
        .method("plus", |(a, b): (f64, f64)| async move { Ok(a + b) })
        .method("minus", |(a, b): (f64, f64)| async move { Ok(a - b) })
        .method("multiply", |(a, b): (f64, f64)| async move { Ok(a * b) })
        .method("divide", |(a, b): (f64, f64)| async move {
            if b == 0.0 {
                return Err(Fault::new("DivisionError", "division by zero"));
            }
            Ok(a / b)
        })
}

fn nested() -> Provider {
    Provider::new().object(
        "math",
        Provider::new()
            .object(
                "scalar",
                Provider::new()
                    .method("add", |(a, b): (f64, f64)| async move { Ok(a + b) })
                    .method("multiply", |(a, b): (f64, f64)| async move { Ok(a * b) }),
            )
            .object(
                "vector",
                Provider::new().method("add", |(u, v): (Vec<f64>, Vec<f64>)| async move {
                    if u.len() != v.len() {
                        return Err(Fault::new("DimensionError", "length mismatch"));
                    }
                    Ok(u.iter().zip(&v).map(|(a, b)| a + b).collect::<Vec<f64>>())
                }),
            ),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("calc_server=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg(&args, "--port").unwrap_or(9090);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let server = WsServer::bind(addr).await?;
    tracing::info!("listening on ws://{}", addr);

    loop {
        let acceptor = server.accept().await?;
        tokio::spawn(async move {
            let decision = match acceptor.path() {
                "/simple" => acceptor.accept(simple()).await,
                "/nested" => acceptor.accept(nested()).await,
                _ => acceptor.reject("unknown path").await,
            };
            match decision {
                Ok(()) => acceptor.join().await,
                Err(e) => tracing::warn!("lifecycle error: {}", e),
            }
        });
    }
}

fn parse_arg(args: &[String], flag: &str) -> Option<u16> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
