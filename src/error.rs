use thiserror::Error;

/// Reasons a transaction fails validation against a UTXO set.
///
/// Mirrors the error-kind taxonomy used across this crate: structural
/// problems, dangling/blocked references, authorization failures, and
/// value-rule violations are kept as distinct variants so callers can log
/// a precise reason even though `Mempool::add`/`Chain::add_block` collapse
/// the result to a bool.
#[derive(Debug, Error)]
pub enum TxnError {
    #[error("transaction has no inputs")]
    EmptyInputs,
    #[error("transaction has no outputs")]
    EmptyOutputs,
    #[error("coinbase transaction is not allowed here")]
    Coinbase,
    #[error("input {0} references a UTXO already spent earlier in this transaction")]
    IntraTxDoubleSpend(usize),
    #[error("input {0} references a UTXO that does not exist")]
    MissingUtxo(usize),
    #[error("input {0} has a malformed unlock script")]
    BadUnlockScript(usize),
    #[error("input {0}'s public key does not derive the output's address")]
    AddressMismatch(usize),
    #[error("input {0}'s signature does not verify")]
    BadSignature(usize),
    #[error("output {0} has a negative amount")]
    NegativeOutput(usize),
    #[error("outputs exceed inputs (would create value): fee {0}")]
    Overspend(f64),
}

/// Reasons a block fails validation against a chain tip and UTXO set.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block does not link to the current chain tip")]
    BadLink,
    #[error("block header hash is invalid or does not meet the difficulty target")]
    BadHeader,
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("merkle root does not match the block's transactions")]
    BadMerkleRoot,
    #[error("block must contain exactly one coinbase transaction, at position 0")]
    BadCoinbaseCount,
    #[error("transaction {index} rejected: {source}")]
    Transaction {
        index: usize,
        #[source]
        source: TxnError,
    },
}

/// Reasons a p2p transport operation fails.
#[derive(Debug, Error)]
pub enum P2pError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    BadMessage(#[from] serde_json::Error),
    #[error("not connected to peer {0}")]
    NotConnected(String),
}

/// Reasons a wallet fails to build a transaction.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("address {0} owns no spendable outputs")]
    NoUtxos(String),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },
}
