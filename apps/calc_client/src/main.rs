//! Demo WebSocket calculator client.
//!
//! Runs a short scripted session against calc_server: a few calls on the
//! flat `/simple` provider, a reconnect to `/nested`, and one deliberate
//! remote failure to show error identity surviving the wire.
//!
//!   cargo run -p calc_client -- --url ws://127.0.0.1:9090

use serde_json::Value;
use tracing_subscriber::EnvFilter;

use farrpc::CallError;
use farsock::WsConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("calc_client=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let base = parse_arg(&args, "--url").unwrap_or_else(|| "ws://127.0.0.1:9090".to_string());

    // Flat calculator on /simple.
    let connector = WsConnector::connect(&format!("{}/simple", base), None).await?;
    tracing::info!("connected to {}/simple", base);
    let driver = connector.driver()?;

    let sum: f64 = driver.member("plus").call((2.0, 3.0)).await?;
    println!("2 + 3 = {}", sum);
    let quotient: f64 = driver.member("divide").call((22.0, 7.0)).await?;
    println!("22 / 7 = {}", quotient);

    match driver.member("divide").call::<_, f64>((1.0, 0.0)).await {
        Err(CallError::Remote(fault)) => {
            println!("1 / 0 failed remotely as {}: {}", fault.name, fault.message)
        }
        Ok(value) => anyhow::bail!("1 / 0 unexpectedly returned {}", value),
        Err(other) => anyhow::bail!("1 / 0 failed the wrong way: {}", other),
    }

    connector.close().await?;

    // Namespaced math on /nested, on a fresh connection.
    let connector = WsConnector::connect(&format!("{}/nested", base), None).await?;
    let driver = connector.driver()?;

    let scaled: f64 = driver
        .member("math")
        .member("scalar")
        .member("multiply")
        .call((6.0, 7.0))
        .await?;
    println!("6 * 7 = {}", scaled);

    let vector: Vec<f64> = driver
        .member("math")
        .member("vector")
        .member("add")
        .call((vec![1.0, 2.0], vec![3.0, 4.0]))
        .await?;
    println!("[1,2] + [3,4] = {:?}", vector);

    // Unknown members fail on the remote side, not locally.
    let err = driver
        .member("math")
        .member("matrix")
        .member("add")
        .call::<_, Value>(())
        .await
        .unwrap_err();
    println!("math.matrix.add -> {}", err);

    connector.close().await?;
    Ok(())
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
