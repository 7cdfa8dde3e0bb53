pub mod registry;

pub use registry::{new_contract, ContractRegistry, ContractStore, RecoveryOutcome};
