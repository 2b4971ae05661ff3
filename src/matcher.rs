//! Pure predicates deciding whether an observed transaction is the awaited transfer.
use crate::{
    client::ObservedTransaction,
    error::WatchError,
    units::{parse_units, ETHER_DECIMALS},
};
use primitive_types::U256;

/// `transfer(address,uint256)`
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `transferFrom(address,address,uint256)`
const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];

/// What a watch is waiting for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRequest {
    /// Address that must receive the funds.
    pub recipient: String,
    /// Exact amount in base units.
    pub expected_amount: U256,
    /// Overrides the profile's default threshold when set.
    pub confirmation_threshold: Option<u64>,
    /// ERC-20 contract for token transfers; `None` for native transfers.
    pub token_contract: Option<String>,
}

impl WatchRequest {
    /// Native transfer of exactly `expected_amount` base units to `recipient`.
    pub fn new(recipient: impl Into<String>, expected_amount: U256) -> Self {
        Self {
            recipient: recipient.into(),
            expected_amount,
            confirmation_threshold: None,
            token_contract: None,
        }
    }

    /// Native transfer given as a decimal ether amount (`"0.5"`).
    pub fn from_decimal(recipient: impl Into<String>, amount: &str) -> Result<Self, WatchError> {
        Ok(Self::new(recipient, parse_units(amount, ETHER_DECIMALS)?))
    }

    /// Require `n` confirmations.
    pub fn with_confirmations(mut self, n: u64) -> Self {
        self.confirmation_threshold = Some(n);
        self
    }

    /// Watch for an ERC-20 transfer through `contract` instead of a native one.
    pub fn with_token(mut self, contract: impl Into<String>) -> Self {
        self.token_contract = Some(contract.into());
        self
    }
}

fn normalize(addr: &str) -> String {
    addr.trim().to_ascii_lowercase()
}

fn same_address(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Native transfer check: `to` present and equal to `recipient` (trimmed,
/// case-insensitive) and `value` exactly equal to `expected_amount`.
pub fn validate(tx: &ObservedTransaction, expected_amount: U256, recipient: &str) -> bool {
    match tx.to.as_deref() {
        Some(to) => same_address(to, recipient) && tx.value == expected_amount,
        None => false,
    }
}

/// Dispatch on the request kind: native value or ERC-20 calldata.
pub fn matches_request(tx: &ObservedTransaction, req: &WatchRequest) -> bool {
    match req.token_contract.as_deref() {
        None => validate(tx, req.expected_amount, &req.recipient),
        Some(contract) => {
            let to_contract = tx.to.as_deref().is_some_and(|to| same_address(to, contract));
            to_contract
                && decode_token_transfer(&tx.input).is_some_and(|(to, amount)| {
                    amount == req.expected_amount && same_address(&to, &req.recipient)
                })
        }
    }
}

/// Extract `(recipient, amount)` from ERC-20 `transfer`/`transferFrom` calldata.
fn decode_token_transfer(input: &[u8]) -> Option<(String, U256)> {
    if input.len() < 4 {
        return None;
    }
    let (selector, args) = input.split_at(4);
    let words: Vec<&[u8]> = args.chunks_exact(32).collect();
    let (to_word, amount_word) = match selector {
        s if s == TRANSFER_SELECTOR && words.len() >= 2 => (words[0], words[1]),
        s if s == TRANSFER_FROM_SELECTOR && words.len() >= 3 => (words[1], words[2]),
        _ => return None,
    };
    // address is right-aligned in its word
    if to_word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let to = format!("0x{}", hex::encode(&to_word[12..]));
    Some((to, U256::from_big_endian(amount_word)))
}
