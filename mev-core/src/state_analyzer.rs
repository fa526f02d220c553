//! StateAnalyzer (C4) — pre/post state diff, gas, price-impact, event
//! extraction.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::decoder::{EventDecoder, ParsedEvent};
use crate::types::{SimulationResult, StateSnapshot, Transaction};

/// Sign-preserving balance delta over the union of addresses present in
/// either snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub diff: i128,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
    pub absolute: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Clone)]
pub struct StateAnalysis {
    pub balance_deltas: HashMap<String, BalanceDelta>,
    pub price_deltas: HashMap<String, PriceDelta>,
}

pub struct StateAnalyzer {
    decoder: EventDecoder,
}

impl StateAnalyzer {
    pub fn new(decoder: EventDecoder) -> Self {
        StateAnalyzer { decoder }
    }

    /// Balance deltas over the union of addresses: present in post but not
    /// pre is treated as `+balance`; present in pre but missing in post as
    /// `-balance`.
    pub fn analyze(&self, pre: &StateSnapshot, post: &StateSnapshot) -> StateAnalysis {
        let mut balance_deltas = HashMap::new();
        let addresses: std::collections::HashSet<&String> =
            pre.accounts.keys().chain(post.accounts.keys()).collect();

        for address in addresses {
            let pre_balance = pre.accounts.get(address).map(|a| a.balance);
            let post_balance = post.accounts.get(address).map(|a| a.balance);
            let diff = match (pre_balance, post_balance) {
                (Some(p), Some(q)) => decimal_to_i128(q - p),
                (None, Some(q)) => decimal_to_i128(q),
                (Some(p), None) => -decimal_to_i128(p),
                (None, None) => 0,
            };
            balance_deltas.insert(address.clone(), BalanceDelta { diff });
        }

        let mut price_deltas = HashMap::new();
        let tokens: std::collections::HashSet<&String> = pre
            .spot_prices
            .keys()
            .chain(post.spot_prices.keys())
            .collect();
        for token in tokens {
            let pre_price = pre.spot_prices.get(token).copied().unwrap_or(Decimal::ZERO);
            let post_price = post.spot_prices.get(token).copied().unwrap_or(Decimal::ZERO);
            let absolute = post_price - pre_price;
            let percentage = if pre_price.is_zero() {
                Decimal::ZERO
            } else {
                absolute / pre_price
            };
            price_deltas.insert(token.clone(), PriceDelta { absolute, percentage });
        }

        StateAnalysis { balance_deltas, price_deltas }
    }

    /// `gas_used × gas_price`, exact integer arithmetic via `Decimal`.
    pub fn gas_usage(&self, result: &SimulationResult, tx: &Transaction) -> Decimal {
        Decimal::from(result.gas_used) * tx.gas_price
    }

    pub fn extract_events(&self, result: &SimulationResult) -> Vec<ParsedEvent> {
        self.decoder.decode_logs(&result.logs)
    }

    pub fn price_impact(&self, pre: &StateSnapshot, post: &StateSnapshot, token: &str) -> PriceDelta {
        let pre_price = pre.spot_prices.get(token).copied().unwrap_or(Decimal::ZERO);
        let post_price = post.spot_prices.get(token).copied().unwrap_or(Decimal::ZERO);
        let absolute = post_price - pre_price;
        let percentage = if pre_price.is_zero() {
            Decimal::ZERO
        } else {
            absolute / pre_price
        };
        PriceDelta { absolute, percentage }
    }
}

fn decimal_to_i128(d: Decimal) -> i128 {
    let rounded = d.round_dp(0);
    rounded.mantissa() / 10i128.pow(rounded.scale())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountState;
    use rust_decimal_macros::dec;

    fn snapshot(accounts: Vec<(&str, Decimal)>, prices: Vec<(&str, Decimal)>) -> StateSnapshot {
        let mut snap = StateSnapshot::default();
        for (addr, bal) in accounts {
            snap.accounts.insert(
                addr.to_string(),
                AccountState {
                    balance: bal,
                    ..Default::default()
                },
            );
        }
        for (token, price) in prices {
            snap.spot_prices.insert(token.to_string(), price);
        }
        snap
    }

    #[test]
    fn new_address_in_post_counts_as_positive_balance() {
        let analyzer = StateAnalyzer::new(EventDecoder::new());
        let pre = snapshot(vec![], vec![]);
        let post = snapshot(vec![("0xabc", dec!(100))], vec![]);
        let analysis = analyzer.analyze(&pre, &post);
        assert_eq!(analysis.balance_deltas["0xabc"].diff, 100);
    }

    #[test]
    fn missing_in_post_counts_as_negative_balance() {
        let analyzer = StateAnalyzer::new(EventDecoder::new());
        let pre = snapshot(vec![("0xabc", dec!(100))], vec![]);
        let post = snapshot(vec![], vec![]);
        let analysis = analyzer.analyze(&pre, &post);
        assert_eq!(analysis.balance_deltas["0xabc"].diff, -100);
    }

    #[test]
    fn price_impact_division_by_zero_yields_zero() {
        let analyzer = StateAnalyzer::new(EventDecoder::new());
        let pre = snapshot(vec![], vec![]);
        let post = snapshot(vec![], vec![("tokenA", dec!(5))]);
        let delta = analyzer.price_impact(&pre, &post, "tokenA");
        assert_eq!(delta.percentage, Decimal::ZERO);
    }

    #[test]
    fn gas_usage_is_exact_product() {
        let analyzer = StateAnalyzer::new(EventDecoder::new());
        let tx = Transaction {
            hash: "0x1".into(),
            from: "0xa".into(),
            to: None,
            value: dec!(0),
            gas_price: dec!(20),
            gas_limit: 21000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        };
        let result = SimulationResult {
            success: true,
            gas_used: 21000,
            receipt_status: Some(1),
            logs: vec![],
            account_deltas: Default::default(),
            wall_time: std::time::Duration::from_millis(1),
            error: None,
        };
        assert_eq!(analyzer.gas_usage(&result, &tx), dec!(420000));
    }
}
