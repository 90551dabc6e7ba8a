//! In-memory Custody Ledger
//!
//! Tracks quote-currency balances per trader, position-token holdings per
//! `(trader, market, position, side)`, and fees collected. Every
//! settlement checks first and mutates after, so a refused fill changes
//! nothing.
//!
//! The ledger serializes as a flat [`CustodyState`] so that it can travel
//! inside engine snapshots.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::trade::{Amount, Fill, MarketId, PositionId, Side, TraderId};
use crate::ports::ledger::Ledger;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
struct HoldingKey {
    trader: TraderId,
    market: MarketId,
    position: PositionId,
    side: Side,
}

impl HoldingKey {
    fn of(fill: &Fill) -> Self {
        Self {
            trader: fill.trader.clone(),
            market: fill.market_id,
            position: fill.position_id,
            side: fill.side,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CustodyState", from = "CustodyState")]
pub struct InMemoryLedger {
    positions: HashSet<(MarketId, PositionId)>,
    balances: HashMap<TraderId, Amount>,
    holdings: HashMap<HoldingKey, Amount>,
    fees_collected: Amount,
}

/// Persisted form of [`InMemoryLedger`]: sorted lists, with amounts as
/// decimal strings so they survive JSON values beyond `u64`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyState {
    positions: Vec<(MarketId, PositionId)>,
    balances: Vec<BalanceEntry>,
    holdings: Vec<HoldingEntry>,
    #[serde(with = "units")]
    fees_collected: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BalanceEntry {
    trader: TraderId,
    #[serde(with = "units")]
    amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HoldingEntry {
    key: HoldingKey,
    #[serde(with = "units")]
    tokens: Amount,
}

mod units {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::domain::trade::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

impl From<InMemoryLedger> for CustodyState {
    fn from(ledger: InMemoryLedger) -> Self {
        let mut positions: Vec<_> = ledger.positions.into_iter().collect();
        positions.sort_unstable();
        let mut balances: Vec<_> = ledger
            .balances
            .into_iter()
            .map(|(trader, amount)| BalanceEntry { trader, amount })
            .collect();
        balances.sort_unstable_by(|a, b| a.trader.cmp(&b.trader));
        let mut holdings: Vec<_> = ledger
            .holdings
            .into_iter()
            .filter(|(_, tokens)| *tokens > 0)
            .map(|(key, tokens)| HoldingEntry { key, tokens })
            .collect();
        holdings.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        Self {
            positions,
            balances,
            holdings,
            fees_collected: ledger.fees_collected,
        }
    }
}

impl From<CustodyState> for InMemoryLedger {
    fn from(state: CustodyState) -> Self {
        Self {
            positions: state.positions.into_iter().collect(),
            balances: state
                .balances
                .into_iter()
                .map(|entry| (entry.trader, entry.amount))
                .collect(),
            holdings: state
                .holdings
                .into_iter()
                .map(|entry| (entry.key, entry.tokens))
                .collect(),
            fees_collected: state.fees_collected,
        }
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `position` known so a market may list it.
    pub fn register_position(&mut self, market: MarketId, position: PositionId) {
        self.positions.insert((market, position));
    }

    /// Credits `amount` of quote currency to `trader`.
    pub fn deposit(&mut self, trader: &str, amount: Amount) -> anyhow::Result<Amount> {
        let balance = self.balances.entry(trader.to_string()).or_default();
        *balance = balance
            .checked_add(amount)
            .context("balance overflow")?;
        Ok(*balance)
    }

    pub fn balance(&self, trader: &str) -> Amount {
        self.balances.get(trader).copied().unwrap_or_default()
    }

    pub fn holding(&self, trader: &str, market: MarketId, position: PositionId, side: Side) -> Amount {
        let key = HoldingKey {
            trader: trader.to_string(),
            market,
            position,
            side,
        };
        self.holdings.get(&key).copied().unwrap_or_default()
    }

    pub const fn fees_collected(&self) -> Amount {
        self.fees_collected
    }
}

impl Ledger for InMemoryLedger {
    fn position_exists(&self, market: MarketId, position: PositionId) -> bool {
        self.positions.contains(&(market, position))
    }

    fn settle_buy(&mut self, fill: &Fill) -> anyhow::Result<()> {
        let balance = self.balance(&fill.trader);
        ensure!(
            balance >= fill.quote_amount,
            "trader {} has {} but the buy costs {}",
            fill.trader,
            balance,
            fill.quote_amount
        );
        let key = HoldingKey::of(fill);
        let held = self.holdings.get(&key).copied().unwrap_or_default();
        let held = held.checked_add(fill.tokens).context("holding overflow")?;
        let fees = self
            .fees_collected
            .checked_add(fill.fee)
            .context("fee overflow")?;

        self.balances
            .insert(fill.trader.clone(), balance - fill.quote_amount);
        self.holdings.insert(key, held);
        self.fees_collected = fees;
        debug!(trader = %fill.trader, tokens = fill.tokens, paid = fill.quote_amount, "Buy settled");
        Ok(())
    }

    fn settle_sell(&mut self, fill: &Fill) -> anyhow::Result<()> {
        let key = HoldingKey::of(fill);
        let held = self.holdings.get(&key).copied().unwrap_or_default();
        ensure!(
            held >= fill.tokens,
            "trader {} holds {} {} tokens of position {} but sells {}",
            fill.trader,
            held,
            fill.side,
            fill.position_id,
            fill.tokens
        );
        let balance = self
            .balance(&fill.trader)
            .checked_add(fill.quote_amount)
            .context("balance overflow")?;
        let fees = self
            .fees_collected
            .checked_add(fill.fee)
            .context("fee overflow")?;

        self.holdings.insert(key, held - fill.tokens);
        self.balances.insert(fill.trader.clone(), balance);
        self.fees_collected = fees;
        debug!(trader = %fill.trader, tokens = fill.tokens, received = fill.quote_amount, "Sell settled");
        Ok(())
    }
}
