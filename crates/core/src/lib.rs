pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod error;
pub mod timeframe;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, DatabaseConfig, EngineConfig, ExecutionConfig, SchedulerConfig, SizingConfig,
};
pub use config_loader::ConfigLoader;
pub use config_watcher::ConfigWatcher;
pub use error::EngineError;
pub use timeframe::Timeframe;
pub use traits::{ExecutionHandler, MarketDataProvider, PhaseProvider};
pub use types::{
    IndicatorSnapshot, MarketPhase, OrderFill, OrderRequest, OrderSide, PortfolioContext,
};
