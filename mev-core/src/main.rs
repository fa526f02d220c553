use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mev_core::config::MevCoreConfig;
use mev_core::types::{AlertCondition, AlertRule, AlertType, Transaction};
use mev_core::MevCore;
use rust_decimal_macros::dec;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("🚀 Starting mev-core demo...");

    let config = MevCoreConfig::default();
    let core = Arc::new(MevCore::new(config, 42).await?);
    info!("✅ mev-core initialized");

    core.alerts.register(AlertRule {
        id: "loss-rate-100".to_string(),
        alert_type: AlertType::Profitability,
        condition: AlertCondition::LossRateAbove,
        threshold: 0.70,
        window: 100,
        enabled: true,
    });
    info!("✅ registered default loss-rate alert rule");

    info!("📊 fork pool stats: {:?}", core.fork_manager.stats());
    info!("🔍 strategies enabled: {}", mev_core::types::StrategyKind::ALL.len());

    let mut opportunities = core.take_opportunity_receiver().expect("first receiver");
    tokio::spawn(async move {
        while let Some(opportunity) = opportunities.recv().await {
            info!("💰 opportunity published: {} net={}", opportunity.id, opportunity.net_profit);
        }
    });

    core.submit_transaction(
        Transaction {
            hash: "0xdemo".to_string(),
            from: "0x0000000000000000000000000000000000dead".to_string(),
            to: Some("0x0000000000000000000000000000000000beef".to_string()),
            value: dec!(0),
            gas_price: dec!(20),
            gas_limit: 21000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        },
        0,
    )?;

    tokio::time::sleep(Duration::from_millis(50)).await;

    info!("🛑 shutting down demo");
    core.stop().await?;
    Ok(())
}
