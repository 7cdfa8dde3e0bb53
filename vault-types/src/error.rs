use serde::Serialize;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

/// Machine-readable failure class. Serialized as the wire name operators grep for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    EncodingError,
    DecodingError,
    IndexerUnavailable,
    InsufficientInputError,
    VaultUtxoNotFound,
    ScriptMismatchError,
    InsufficientBalanceError,
    NotFoundError,
    AlreadyInFlight,
    TradingDisabled,
    Unauthorized,
    InvalidAddress,
    InvalidAmount,
    ContractNotRegistered,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EncodingError => "EncodingError",
            ErrorKind::DecodingError => "DecodingError",
            ErrorKind::IndexerUnavailable => "IndexerUnavailable",
            ErrorKind::InsufficientInputError => "InsufficientInputError",
            ErrorKind::VaultUtxoNotFound => "VaultUtxoNotFound",
            ErrorKind::ScriptMismatchError => "ScriptMismatchError",
            ErrorKind::InsufficientBalanceError => "InsufficientBalanceError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::AlreadyInFlight => "AlreadyInFlight",
            ErrorKind::TradingDisabled => "TradingDisabled",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::InvalidAddress => "InvalidAddress",
            ErrorKind::InvalidAmount => "InvalidAmount",
            ErrorKind::ContractNotRegistered => "ContractNotRegistered",
            ErrorKind::StorageError => "StorageError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("decoding failed: {0}")]
    Decoding(String),

    #[error("chain indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("insufficient input: {0}")]
    InsufficientInput(String),

    #[error("no spendable vault UTxO at {address}: {reason}")]
    VaultUtxoNotFound { address: String, reason: String },

    #[error("script mismatch at {address}: {reason}")]
    ScriptMismatch { address: String, reason: String },

    #[error("trade refused: {0}")]
    InsufficientBalance(String),

    #[error("registry entry {0} not found")]
    NotFound(String),

    #[error("a build for {0} is already in flight")]
    AlreadyInFlight(String),

    #[error("agent trading is disabled for vault {0}")]
    TradingDisabled(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no registered contract for {0}")]
    ContractNotRegistered(String),

    #[error("registry storage: {0}")]
    Storage(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Encoding(_) => ErrorKind::EncodingError,
            VaultError::Decoding(_) => ErrorKind::DecodingError,
            VaultError::IndexerUnavailable(_) => ErrorKind::IndexerUnavailable,
            VaultError::InsufficientInput(_) => ErrorKind::InsufficientInputError,
            VaultError::VaultUtxoNotFound { .. } => ErrorKind::VaultUtxoNotFound,
            VaultError::ScriptMismatch { .. } => ErrorKind::ScriptMismatchError,
            VaultError::InsufficientBalance(_) => ErrorKind::InsufficientBalanceError,
            VaultError::NotFound(_) => ErrorKind::NotFoundError,
            VaultError::AlreadyInFlight(_) => ErrorKind::AlreadyInFlight,
            VaultError::TradingDisabled(_) => ErrorKind::TradingDisabled,
            VaultError::Unauthorized(_) => ErrorKind::Unauthorized,
            VaultError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            VaultError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            VaultError::ContractNotRegistered(_) => ErrorKind::ContractNotRegistered,
            VaultError::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Only indexer transience may be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::IndexerUnavailable(_))
    }

    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        VaultError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}
