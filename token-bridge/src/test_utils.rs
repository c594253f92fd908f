//! Scriptable chain client and event builders for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{address, Address, B256, U256};
use async_trait::async_trait;

use crate::amount::TokenAmount;
use crate::chain_client::{ChainClient, ChainError, ContractCall, TxOptions, TxReceipt};
use crate::events::{BridgeEvent, ChainEvent, EventKind};

/// Contract address reported by [`MockChainClient`].
pub const MOCK_CONTRACT: Address = address!("00000000000000000000000000000000000000c0");

/// Signing account reported by [`MockChainClient`].
pub const MOCK_SIGNER: Address = address!("00000000000000000000000000000000000000d0");

/// Whole tokens as a [`TokenAmount`].
pub fn tokens(amount: u64) -> TokenAmount {
    TokenAmount::from_tokens(amount)
}

/// Wraps `event` as if it was emitted by a tx whose hash is `tx` repeated.
pub fn chain_event(event: BridgeEvent, block_number: u64, tx: u8, log_index: u64) -> ChainEvent {
    ChainEvent {
        event,
        block_number,
        tx_hash: B256::repeat_byte(tx),
        log_index,
    }
}

#[derive(Debug)]
struct MockState {
    block_number: u64,
    block_number_fails: bool,
    events: HashMap<EventKind, Vec<ChainEvent>>,
    fetch_failures: HashMap<EventKind, usize>,
    fetched: Vec<(EventKind, u64, u64)>,
    can_distribute: bool,
    can_distribute_calls: usize,
    reads_fail: bool,
    balances: HashMap<Address, TokenAmount>,
    total_staked: TokenAmount,
    current_epoch: U256,
    signer: Option<Address>,
    receipt_success: bool,
    submit_fails: bool,
    submissions: Vec<(ContractCall, TxOptions)>,
}

/// In-memory [`ChainClient`] whose answers and failures are set by the test.
#[derive(Debug)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    /// A reachable chain at height zero whose epoch is ready for distribution.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                block_number: 0,
                block_number_fails: false,
                events: HashMap::new(),
                fetch_failures: HashMap::new(),
                fetched: Vec::new(),
                can_distribute: true,
                can_distribute_calls: 0,
                reads_fail: false,
                balances: HashMap::new(),
                total_staked: TokenAmount::ZERO,
                current_epoch: U256::ZERO,
                signer: Some(MOCK_SIGNER),
                receipt_success: true,
                submit_fails: false,
                submissions: Vec::new(),
            }),
        }
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state.lock().unwrap().block_number = block_number;
    }

    pub fn fail_block_number(&self, fail: bool) {
        self.state.lock().unwrap().block_number_fails = fail;
    }

    /// Adds a log returned by `fetch_events` for ranges covering its block.
    pub fn push_event(&self, kind: EventKind, event: ChainEvent) {
        self.state
            .lock()
            .unwrap()
            .events
            .entry(kind)
            .or_default()
            .push(event);
    }

    /// Makes the next `times` fetches of `kind` fail.
    pub fn fail_fetch(&self, kind: EventKind, times: usize) {
        self.state.lock().unwrap().fetch_failures.insert(kind, times);
    }

    /// Every `(kind, from, to)` fetched so far, including failed ones.
    pub fn fetched_kinds(&self) -> Vec<(EventKind, u64, u64)> {
        self.state.lock().unwrap().fetched.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetched.len()
    }

    pub fn set_can_distribute(&self, can_distribute: bool) {
        self.state.lock().unwrap().can_distribute = can_distribute;
    }

    pub fn can_distribute_calls(&self) -> usize {
        self.state.lock().unwrap().can_distribute_calls
    }

    /// Makes every view call fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().reads_fail = fail;
    }

    pub fn set_balance(&self, account: Address, balance: TokenAmount) {
        self.state.lock().unwrap().balances.insert(account, balance);
    }

    pub fn set_total_staked(&self, total: TokenAmount) {
        self.state.lock().unwrap().total_staked = total;
    }

    pub fn set_current_epoch(&self, epoch: u64) {
        self.state.lock().unwrap().current_epoch = U256::from(epoch);
    }

    pub fn set_signer(&self, signer: Option<Address>) {
        self.state.lock().unwrap().signer = signer;
    }

    /// Whether mined transactions succeed or revert.
    pub fn set_receipt_success(&self, success: bool) {
        self.state.lock().unwrap().receipt_success = success;
    }

    /// Makes `submit` fail before anything is mined.
    pub fn fail_submit(&self, fail: bool) {
        self.state.lock().unwrap().submit_fails = fail;
    }

    pub fn submissions(&self) -> Vec<(ContractCall, TxOptions)> {
        self.state.lock().unwrap().submissions.clone()
    }
}

fn unreachable() -> ChainError {
    ChainError::Rpc {
        source: alloy::transports::TransportErrorKind::custom_str("mock rpc unreachable"),
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> u64 {
        84532
    }

    fn contract_address(&self) -> Address {
        MOCK_CONTRACT
    }

    fn signer_address(&self) -> Option<Address> {
        self.state.lock().unwrap().signer
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.block_number_fails {
            return Err(unreachable());
        }
        Ok(state.block_number)
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push((kind, from, to));

        if let Some(remaining) = state.fetch_failures.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unreachable());
            }
        }

        Ok(state
            .events
            .get(&kind)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| (from..=to).contains(&event.block_number))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn can_distribute_rewards(&self) -> Result<bool, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.can_distribute_calls += 1;
        if state.reads_fail {
            return Err(unreachable());
        }
        Ok(state.can_distribute)
    }

    async fn balance_of(&self, account: Address) -> Result<TokenAmount, ChainError> {
        let state = self.state.lock().unwrap();
        if state.reads_fail {
            return Err(unreachable());
        }
        Ok(state.balances.get(&account).copied().unwrap_or_default())
    }

    async fn total_staked(&self) -> Result<TokenAmount, ChainError> {
        let state = self.state.lock().unwrap();
        if state.reads_fail {
            return Err(unreachable());
        }
        Ok(state.total_staked)
    }

    async fn current_epoch(&self) -> Result<U256, ChainError> {
        let state = self.state.lock().unwrap();
        if state.reads_fail {
            return Err(unreachable());
        }
        Ok(state.current_epoch)
    }

    async fn submit(&self, call: ContractCall, options: TxOptions) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.submit_fails {
            return Err(unreachable());
        }
        state.submissions.push((call, options));
        let nonce = state.submissions.len() as u8;
        Ok(TxReceipt {
            tx_hash: B256::repeat_byte(0xf0 | nonce),
            block_number: Some(state.block_number + 1),
            success: state.receipt_success,
        })
    }
}
