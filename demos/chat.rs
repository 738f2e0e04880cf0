use resilient_http::{ResilientClient, ServiceConfig, ServiceGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    let gateway = ServiceGateway::new(ResilientClient::new(), config);

    let health = gateway.health().await;
    if !health.is_success() {
        eprintln!("chat API unhealthy (status {})", health.status());
    }

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What services do you offer?".to_owned());
    let envelope = gateway
        .chat(&serde_json::json!({ "message": question }))
        .await;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
