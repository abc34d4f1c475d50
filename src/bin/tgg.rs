use anyhow::Result;
use std::sync::Arc;
use tigris_groupguard::{AppContext, config::Settings, run};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let ctx: Arc<AppContext> = AppContext::bootstrap(settings).await?;
    run(ctx).await
}
