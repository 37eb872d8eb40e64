//! Contract event schemas and the typed events decoded from chain logs.
//!
//! Only the two events the watcher cares about are described here:
//! `Reward` on the BondingManager and `NewRound` on the RoundsManager.
//! Both carry their interesting argument as an indexed topic, so decoding
//! never needs the non-indexed data section.

use alloy::primitives::{Address, B256, U256, address, keccak256};

/// A contract event the watcher subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSchema {
    /// Short event name, used in logs.
    pub name: &'static str,
    /// Canonical signature, hashed to obtain topic0.
    pub signature: &'static str,
}

impl EventSchema {
    /// The event signature id (keccak-256 of the canonical signature).
    pub fn topic(&self) -> B256 {
        keccak256(self.signature.as_bytes())
    }
}

/// `Reward(address indexed transcoder, uint256 amount)`
pub const REWARD_EVENT: EventSchema = EventSchema {
    name: "Reward",
    signature: "Reward(address,uint256)",
};

/// `NewRound(uint256 indexed round, bytes32 blockHash)`
pub const NEW_ROUND_EVENT: EventSchema = EventSchema {
    name: "NewRound",
    signature: "NewRound(uint256,bytes32)",
};

/// Contract deployments the watcher listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub bonding_manager: Address,
    pub rounds_manager: Address,
}

impl ContractAddresses {
    /// Livepeer BondingManager on Arbitrum One.
    pub const ARBITRUM_BONDING_MANAGER: Address =
        address!("35Bcf3c30594191d53231E4FF333E8A770453e40");
    /// Livepeer RoundsManager on Arbitrum One.
    pub const ARBITRUM_ROUNDS_MANAGER: Address =
        address!("dd6f56DcC28D3F5f27084381fE8Df634985cc39f");
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            bonding_manager: Self::ARBITRUM_BONDING_MANAGER,
            rounds_manager: Self::ARBITRUM_ROUNDS_MANAGER,
        }
    }
}

/// Which of the two feeds an event or fault belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Reward,
    NewRound,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Reward => write!(f, "Reward"),
            FeedKind::NewRound => write!(f, "NewRound"),
        }
    }
}

/// The parts of an RPC log entry the watcher reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainLog {
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub topics: Vec<B256>,
}

impl From<alloy::rpc::types::Log> for ChainLog {
    fn from(log: alloy::rpc::types::Log) -> Self {
        Self {
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            topics: log.topics().to_vec(),
        }
    }
}

/// The tracked participant called reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardCall {
    pub block_number: u64,
    pub transaction_hash: B256,
}

impl From<&ChainLog> for RewardCall {
    fn from(log: &ChainLog) -> Self {
        Self {
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
        }
    }
}

/// A new protocol round was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRound {
    pub round: u64,
}

impl From<&ChainLog> for NewRound {
    /// A log without the indexed round topic decodes as round 0.
    fn from(log: &ChainLog) -> Self {
        let round = log.topics.get(1).map(low_u64).unwrap_or(0);
        Self { round }
    }
}

/// The low 64 bits of a 32-byte word, read big-endian.
fn low_u64(word: &B256) -> u64 {
    U256::from_be_bytes(word.0).as_limbs()[0]
}

/// Topic value matching an indexed `address` argument.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    #[test]
    fn test_event_topics() {
        // Well-known selector, checks the hashing path.
        let transfer = EventSchema {
            name: "Transfer",
            signature: "Transfer(address,address,uint256)",
        };
        assert_eq!(
            transfer.topic(),
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
        assert_ne!(REWARD_EVENT.topic(), NEW_ROUND_EVENT.topic());
    }

    #[test]
    fn test_new_round_decoding() {
        let log = ChainLog {
            block_number: Some(10),
            transaction_hash: None,
            topics: vec![
                NEW_ROUND_EVENT.topic(),
                B256::from(U256::from(3_512u64).to_be_bytes::<32>()),
            ],
        };
        assert_eq!(NewRound::from(&log).round, 3_512);
    }

    #[test]
    fn test_new_round_keeps_low_64_bits() {
        let word = (U256::from(1u64) << 64usize) | U256::from(7u64);
        let log = ChainLog {
            topics: vec![NEW_ROUND_EVENT.topic(), B256::from(word.to_be_bytes::<32>())],
            ..Default::default()
        };
        assert_eq!(NewRound::from(&log).round, 7);
    }

    #[test]
    fn test_new_round_without_round_topic_is_zero() {
        let log = ChainLog {
            topics: vec![NEW_ROUND_EVENT.topic()],
            ..Default::default()
        };
        assert_eq!(NewRound::from(&log).round, 0);
        assert_eq!(NewRound::from(&ChainLog::default()).round, 0);
    }

    #[test]
    fn test_reward_call_decoding() {
        let tx = b256!("00000000000000000000000000000000000000000000000000000000000000ab");
        let log = ChainLog {
            block_number: Some(7_000_000),
            transaction_hash: Some(tx),
            topics: vec![REWARD_EVENT.topic()],
        };
        let call = RewardCall::from(&log);
        assert_eq!(call.block_number, 7_000_000);
        assert_eq!(call.transaction_hash, tx);
    }

    #[test]
    fn test_address_topic_is_left_padded() {
        let addr = address!("35Bcf3c30594191d53231E4FF333E8A770453e40");
        let topic = address_topic(addr);
        assert!(topic.0[..12].iter().all(|b| *b == 0));
        assert_eq!(&topic.0[12..], addr.as_slice());
    }
}
