pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{DataSourceError, KlineMarketData, MarketDataProvider, MockMarketData};
pub use db::{init_db, Repository};
pub use domain::{Candle, Decimal, OwnerId, Position, Side, TimeMs};
pub use engine::{EngineError, GameRules, GameSession};
pub use error::AppError;
