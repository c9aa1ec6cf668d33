//! Composition of the contract calls used by chain-backed threads.

use anyhow::anyhow;
use tracing::debug;

use circles_types::CircleError;
use circles_types::store::ChainClient;

/// Chain references are stored as decimal record indices.
pub fn parse_index(blockchain_id: &str) -> Option<u64> {
    blockchain_id.trim().parse::<u64>().ok()
}

/// Create a record and return its index.
///
/// The contract does not return the new index, so it is taken as the record
/// count after confirmation, minus one.
pub async fn create_record(chain: &dyn ChainClient, content: &str) -> Result<u64, CircleError> {
    chain.create_record(content).await.map_err(CircleError::Chain)?;
    let count = chain.record_count().await.map_err(CircleError::Chain)?;
    let index = count
        .checked_sub(1)
        .ok_or_else(|| CircleError::Chain(anyhow!("record count is zero after create")))?;
    debug!("chain record {} created", index);
    Ok(index)
}

pub async fn record_content(chain: &dyn ChainClient, index: u64) -> Result<String, CircleError> {
    let record = chain.get_record(index).await.map_err(CircleError::Chain)?;
    Ok(record.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_indices_only() {
        assert_eq!(parse_index("0"), Some(0));
        assert_eq!(parse_index(" 12 "), Some(12));
        assert_eq!(parse_index("0x0c"), None);
        assert_eq!(parse_index(""), None);
    }
}
