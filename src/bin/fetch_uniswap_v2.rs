use tracing::error;
use tracing_subscriber::EnvFilter;

use dex_cost::config::Config;
use dex_cost::fetcher::{self, uniswap_v2::UniswapV2Swap};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = fetcher::run::<UniswapV2Swap>(&cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
