//! Scripted ledger doubles
//!
//! Available to unit tests and, with the `testing` feature, to downstream
//! crates. Behaviour is scripted per [`MessageKey`]; anything not scripted
//! finalizes on the first query and relays successfully.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use crate::codec;
use crate::ledger::{DestinationLedger, LedgerError, SourceLedger};
use crate::types::{
    CrossChainMessage, DestinationReceipt, MessageKey, SourceReceipt, SUCCESS_STATUS,
};

/// Sender used by [`message`]
pub const TEST_SENDER: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

/// A small message from [`TEST_SENDER`] with the given sequence
pub fn message(sequence: u64) -> CrossChainMessage {
    CrossChainMessage {
        sender: TEST_SENDER,
        sequence,
        nonce: sequence as u32,
        topic: 1,
        payload: Bytes::from(sequence.to_be_bytes().to_vec()),
        consistency_level: 1,
    }
}

/// A successful source receipt carrying `messages` as published logs
pub fn receipt_with(transaction_hash: B256, messages: &[CrossChainMessage]) -> SourceReceipt {
    SourceReceipt {
        transaction_hash,
        status: SUCCESS_STATUS,
        logs: messages.iter().map(codec::encode).collect(),
    }
}

#[derive(Debug, Clone)]
enum FinalityScript {
    /// `false` this many times, then `true`
    After(u32),
    Never,
    /// `false` this many times, then the error on every later query
    FailAfter(u32, LedgerError),
}

#[derive(Debug, Default)]
struct DestinationState {
    checks: HashMap<MessageKey, u32>,
    finality_time_lookups: u32,
    gas_limits: Vec<u64>,
    submit_errors: HashMap<MessageKey, VecDeque<LedgerError>>,
    submissions: HashMap<MessageKey, u32>,
    relayed: Vec<MessageKey>,
}

/// Destination ledger double
#[derive(Debug)]
pub struct MockDestination {
    finality: HashMap<MessageKey, FinalityScript>,
    query_delays: HashMap<MessageKey, Duration>,
    query_delay: Duration,
    estimate: Result<u64, LedgerError>,
    finality_times: HashMap<MessageKey, U256>,
    finality_time_delay: Duration,
    relay_statuses: HashMap<MessageKey, u64>,
    state: Mutex<DestinationState>,
}

impl Default for MockDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDestination {
    pub fn new() -> Self {
        Self {
            finality: HashMap::new(),
            query_delays: HashMap::new(),
            query_delay: Duration::ZERO,
            estimate: Ok(100_000),
            finality_times: HashMap::new(),
            finality_time_delay: Duration::ZERO,
            relay_statuses: HashMap::new(),
            state: Mutex::new(DestinationState::default()),
        }
    }

    /// Answer `false` to the first `negatives` queries, then `true`
    pub fn finalize_after(mut self, key: MessageKey, negatives: u32) -> Self {
        self.finality.insert(key, FinalityScript::After(negatives));
        self
    }

    pub fn never_finalize(mut self, key: MessageKey) -> Self {
        self.finality.insert(key, FinalityScript::Never);
        self
    }

    /// Answer `false` to the first `negatives` queries, then fail
    pub fn fail_query_after(mut self, key: MessageKey, negatives: u32, error: LedgerError) -> Self {
        self.finality
            .insert(key, FinalityScript::FailAfter(negatives, error));
        self
    }

    /// Delay every finality query by `delay`
    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Delay finality queries for one message only
    pub fn query_delay_for(mut self, key: MessageKey, delay: Duration) -> Self {
        self.query_delays.insert(key, delay);
        self
    }

    pub fn estimate(mut self, gas: u64) -> Self {
        self.estimate = Ok(gas);
        self
    }

    pub fn fail_estimate(mut self, error: LedgerError) -> Self {
        self.estimate = Err(error);
        self
    }

    pub fn with_finality_time(mut self, key: MessageKey, time: U256) -> Self {
        self.finality_times.insert(key, time);
        self
    }

    /// Delay every finality time lookup by `delay`
    pub fn finality_time_delay(mut self, delay: Duration) -> Self {
        self.finality_time_delay = delay;
        self
    }

    /// Relay receipts for `key` report `status`
    pub fn relay_status(mut self, key: MessageKey, status: u64) -> Self {
        self.relay_statuses.insert(key, status);
        self
    }

    /// Relay submissions for `key` fail with these errors, in order, before succeeding
    pub fn fail_submissions(self, key: MessageKey, errors: Vec<LedgerError>) -> Self {
        self.lock().submit_errors.insert(key, errors.into());
        self
    }

    /// Keys with a successful relay receipt, in submission order
    pub fn relayed(&self) -> Vec<MessageKey> {
        self.lock().relayed.clone()
    }

    /// Finality queries issued for `key`
    pub fn check_count(&self, key: &MessageKey) -> u32 {
        self.lock().checks.get(key).copied().unwrap_or(0)
    }

    /// Relay submissions attempted for `key`, including failed ones
    pub fn submission_count(&self, key: &MessageKey) -> u32 {
        self.lock().submissions.get(key).copied().unwrap_or(0)
    }

    /// Finality time lookups started, across all messages
    pub fn finality_time_lookups(&self) -> u32 {
        self.lock().finality_time_lookups
    }

    /// Gas limits sent with finality queries, in order
    pub fn gas_limits(&self) -> Vec<u64> {
        self.lock().gas_limits.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DestinationState> {
        self.state.lock().expect("mock destination state poisoned")
    }
}

#[async_trait]
impl DestinationLedger for MockDestination {
    async fn estimate_finality_check(
        &self,
        _message: &CrossChainMessage,
    ) -> Result<u64, LedgerError> {
        self.estimate.clone()
    }

    async fn check_finality(
        &self,
        message: &CrossChainMessage,
        gas_limit: u64,
    ) -> Result<bool, LedgerError> {
        let key = message.key();
        let delay = self
            .query_delays
            .get(&key)
            .copied()
            .unwrap_or(self.query_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let previous = {
            let mut state = self.lock();
            state.gas_limits.push(gas_limit);
            let count = state.checks.entry(key).or_insert(0);
            *count += 1;
            *count - 1
        };

        match self.finality.get(&key) {
            None => Ok(true),
            Some(FinalityScript::Never) => Ok(false),
            Some(FinalityScript::After(negatives)) => Ok(previous >= *negatives),
            Some(FinalityScript::FailAfter(negatives, error)) => {
                if previous >= *negatives {
                    Err(error.clone())
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn finality_time(
        &self,
        message: &CrossChainMessage,
    ) -> Result<Option<U256>, LedgerError> {
        self.lock().finality_time_lookups += 1;
        if !self.finality_time_delay.is_zero() {
            tokio::time::sleep(self.finality_time_delay).await;
        }
        Ok(self.finality_times.get(&message.key()).copied())
    }

    async fn submit_relay(
        &self,
        message: &CrossChainMessage,
    ) -> Result<DestinationReceipt, LedgerError> {
        let key = message.key();
        let mut state = self.lock();
        let attempt = {
            let count = state.submissions.entry(key).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(error) = state
            .submit_errors
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let status = self
            .relay_statuses
            .get(&key)
            .copied()
            .unwrap_or(SUCCESS_STATUS);
        if status == SUCCESS_STATUS {
            state.relayed.push(key);
        }

        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&key.sequence.to_be_bytes());
        id[8..12].copy_from_slice(&attempt.to_be_bytes());
        id[12..].copy_from_slice(key.sender.as_slice());

        Ok(DestinationReceipt {
            transaction_id: B256::from(id),
            status,
        })
    }
}

/// Source ledger double serving canned receipts
#[derive(Debug, Default)]
pub struct MockSource {
    receipts: HashMap<B256, SourceReceipt>,
    trigger: Option<Result<SourceReceipt, LedgerError>>,
    submitted: Mutex<Vec<TransactionRequest>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receipt(mut self, receipt: SourceReceipt) -> Self {
        self.receipts.insert(receipt.transaction_hash, receipt);
        self
    }

    /// Receipt returned by [`SourceLedger::submit`]
    pub fn on_submit(mut self, result: Result<SourceReceipt, LedgerError>) -> Self {
        self.trigger = Some(result);
        self
    }

    pub fn submitted(&self) -> Vec<TransactionRequest> {
        self.submitted
            .lock()
            .expect("mock source state poisoned")
            .clone()
    }
}

#[async_trait]
impl SourceLedger for MockSource {
    async fn submit(&self, request: TransactionRequest) -> Result<SourceReceipt, LedgerError> {
        self.submitted
            .lock()
            .expect("mock source state poisoned")
            .push(request);
        self.trigger
            .clone()
            .unwrap_or_else(|| Err(LedgerError::Rpc("no submit result scripted".into())))
    }

    async fn receipt(&self, transaction: B256) -> Result<Option<SourceReceipt>, LedgerError> {
        Ok(self.receipts.get(&transaction).cloned())
    }
}
