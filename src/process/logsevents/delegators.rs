//! Delegation-contract events. The event address is the delegator, the log
//! address the delegation contract. Topics: `[amount, totalActiveStake,
//! ...]`; unDelegate adds the created fund id at topic 2, withdraw lists the
//! withdrawn fund ids from topic 2 on.

use super::{EventContext, EventOutput, EventProcessor, DELEGATE, UN_DELEGATE, WITHDRAW};
use crate::converters::BalanceConverter;
use crate::core::PubkeyConverter;
use crate::data::{Delegator, EventData, UnDelegateInfo};
use num_bigint::{BigInt, Sign};
use std::sync::Arc;

pub(super) struct DelegatorsProcessor {
    pubkey_converter: Arc<dyn PubkeyConverter>,
    balance_converter: Arc<BalanceConverter>,
}

impl DelegatorsProcessor {
    pub(super) fn new(
        pubkey_converter: Arc<dyn PubkeyConverter>,
        balance_converter: Arc<BalanceConverter>,
    ) -> Self {
        Self {
            pubkey_converter,
            balance_converter,
        }
    }
}

impl EventProcessor for DelegatorsProcessor {
    fn process(&self, event: &EventData, ctx: &mut EventContext) -> EventOutput {
        let is_delegation_event = matches!(
            event.identifier.as_str(),
            DELEGATE | UN_DELEGATE | WITHDRAW
        );
        if !is_delegation_event || event.topics.len() < 2 {
            return EventOutput::default();
        }

        let address = self.pubkey_converter.encode(&event.address);
        let contract = self.pubkey_converter.encode(ctx.log_address);
        let active_stake = BigInt::from_bytes_be(Sign::Plus, &event.topics[1]);

        let mut delegator = Delegator {
            address: address.clone(),
            contract: contract.clone(),
            active_stake: active_stake.to_string(),
            active_stake_num: self.balance_converter.compute_balance_as_float(&active_stake),
            timestamp: ctx.timestamp,
            ..Default::default()
        };

        match event.identifier.as_str() {
            UN_DELEGATE if event.topics.len() >= 3 => {
                let value = BigInt::from_bytes_be(Sign::Plus, &event.topics[0]);
                delegator.un_delegate_info = Some(UnDelegateInfo {
                    id: String::from_utf8_lossy(&event.topics[2]).to_string(),
                    value: value.to_string(),
                    value_num: self.balance_converter.compute_balance_as_float(&value),
                    timestamp: ctx.timestamp,
                });
            }
            WITHDRAW => {
                delegator.withdraw_fund_ids = Some(
                    event.topics[2..]
                        .iter()
                        .map(|id| String::from_utf8_lossy(id).to_string())
                        .collect(),
                );
                // A withdraw that empties the position removes the document.
                delegator.should_delete = event.data == b"true";
            }
            _ => {}
        }

        ctx.results
            .delegators
            .insert(format!("{address}{contract}"), delegator);

        EventOutput {
            processed: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HexPubkeyConverter;
    use crate::data::{AlteredAccounts, PreparedLogsResults};
    use std::collections::HashMap;

    fn run(event: &EventData) -> PreparedLogsResults {
        let processor = DelegatorsProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(BalanceConverter::new(18).unwrap()),
        );
        let mut altered = AlteredAccounts::new();
        let mut results = PreparedLogsResults::default();
        let mut statuses = HashMap::new();
        let mut ctx = EventContext {
            timestamp: 7000,
            tx_hash_hex: "aabb",
            log_address: b"contract",
            altered: &mut altered,
            results: &mut results,
            tx_hash_status: &mut statuses,
        };
        let output = processor.process(event, &mut ctx);
        assert!(output.processed);
        results
    }

    #[test]
    fn delegate_updates_active_stake() {
        // 1 EGLD at 18 decimals.
        let stake = [0x0d, 0xe0, 0xb6, 0xb3, 0xa7, 0x64, 0x00, 0x00];
        let event = EventData {
            address: b"delegator1".to_vec(),
            identifier: DELEGATE.to_string(),
            topics: vec![stake.to_vec(), stake.to_vec()],
            data: Vec::new(),
        };

        let results = run(&event);
        let delegator = results.delegators.values().next().unwrap();

        assert_eq!(delegator.address, hex::encode(b"delegator1"));
        assert_eq!(delegator.contract, hex::encode(b"contract"));
        assert_eq!(delegator.active_stake, "1000000000000000000");
        assert_eq!(delegator.active_stake_num, 1.0);
        assert!(delegator.un_delegate_info.is_none());
    }

    #[test]
    fn undelegate_carries_fund_info() {
        let event = EventData {
            address: b"delegator1".to_vec(),
            identifier: UN_DELEGATE.to_string(),
            topics: vec![vec![0x64], vec![0x0a], b"fund-1".to_vec()],
            data: Vec::new(),
        };

        let results = run(&event);
        let delegator = results.delegators.values().next().unwrap();
        let info = delegator.un_delegate_info.as_ref().unwrap();

        assert_eq!(info.id, "fund-1");
        assert_eq!(info.value, "100");
        assert_eq!(info.timestamp, 7000);
    }

    #[test]
    fn withdraw_lists_fund_ids_and_may_delete() {
        let event = EventData {
            address: b"delegator1".to_vec(),
            identifier: WITHDRAW.to_string(),
            topics: vec![vec![0x64], Vec::new(), b"A".to_vec(), b"B".to_vec()],
            data: b"true".to_vec(),
        };

        let results = run(&event);
        let delegator = results.delegators.values().next().unwrap();

        assert_eq!(
            delegator.withdraw_fund_ids.as_ref().unwrap(),
            &vec!["A".to_string(), "B".to_string()]
        );
        assert!(delegator.should_delete);
    }

    #[test]
    fn second_event_for_same_pair_wins() {
        let processor = DelegatorsProcessor::new(
            Arc::new(HexPubkeyConverter),
            Arc::new(BalanceConverter::new(18).unwrap()),
        );
        let mut altered = AlteredAccounts::new();
        let mut results = PreparedLogsResults::default();
        let mut statuses = HashMap::new();

        for stake in [vec![0x01u8], vec![0x02u8]] {
            let event = EventData {
                address: b"delegator1".to_vec(),
                identifier: DELEGATE.to_string(),
                topics: vec![stake.clone(), stake],
                data: Vec::new(),
            };
            let mut ctx = EventContext {
                timestamp: 7000,
                tx_hash_hex: "aabb",
                log_address: b"contract",
                altered: &mut altered,
                results: &mut results,
                tx_hash_status: &mut statuses,
            };
            processor.process(&event, &mut ctx);
        }

        assert_eq!(results.delegators.len(), 1);
        assert_eq!(results.delegators.values().next().unwrap().active_stake, "2");
    }
}
