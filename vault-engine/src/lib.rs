pub mod balance;
pub mod builder;
pub mod config;
pub mod locks;

pub use balance::{evaluate, BalanceManager, TradeFeasibility, TradingRecommendation};
pub use builder::{BuiltTransaction, Deployment, TransactionBuilder};
pub use config::{AdminPolicy, EngineConfig, ProtocolParams, Rational};
