//! Prometheus Metrics Registry - Engine Observability
//!
//! Counts trades, traded volume and fees, tracks the latest direct-side
//! price of every position, and records rejected trades by error
//! category. Rendered in text format at `/metrics` by the HTTP server.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::domain::error::EngineError;
use crate::domain::fixed_point::QuoteScale;
use crate::domain::trade::{MarketId, PriceUpdate, TradeEvent};
use crate::ports::events::EventSink;

/// Centralized Prometheus metrics for the pricing engine.
///
/// All metrics follow the naming convention `lmsr_engine_*` and carry a
/// `market` label.
pub struct MetricsRegistry {
    registry: Registry,
    /// Quote-currency scale used to report amounts in whole units.
    scale: QuoteScale,
    /// Committed trades.
    pub trades: IntCounterVec,
    /// Fee-inclusive quote volume, in whole quote units.
    pub quote_volume: CounterVec,
    /// Fees collected, in whole quote units.
    pub fees_collected: CounterVec,
    /// Tokens per trade, in whole tokens.
    pub trade_size: HistogramVec,
    /// Latest direct-side price per position.
    pub price: GaugeVec,
    /// Trades refused before settlement.
    pub rejected: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new(scale: QuoteScale) -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades = IntCounterVec::new(
            Opts::new("lmsr_engine_trades_total", "Committed trades"),
            &["market", "action", "side"],
        )?;

        let quote_volume = CounterVec::new(
            Opts::new(
                "lmsr_engine_quote_volume_total",
                "Fee-inclusive quote currency volume",
            ),
            &["market", "action"],
        )?;

        let fees_collected = CounterVec::new(
            Opts::new("lmsr_engine_fees_collected_total", "Protocol fees collected"),
            &["market"],
        )?;

        let trade_size = HistogramVec::new(
            HistogramOpts::new("lmsr_engine_trade_size_tokens", "Tokens traded per trade")
                .buckets(vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]),
            &["market"],
        )?;

        let price = GaugeVec::new(
            Opts::new(
                "lmsr_engine_position_price",
                "Direct-side price of a position (probability)",
            ),
            &["market", "position"],
        )?;

        let rejected = IntCounterVec::new(
            Opts::new("lmsr_engine_trades_rejected_total", "Trades refused by the engine"),
            &["market", "category"],
        )?;

        // Register all metrics
        registry.register(Box::new(trades.clone()))?;
        registry.register(Box::new(quote_volume.clone()))?;
        registry.register(Box::new(fees_collected.clone()))?;
        registry.register(Box::new(trade_size.clone()))?;
        registry.register(Box::new(price.clone()))?;
        registry.register(Box::new(rejected.clone()))?;

        Ok(Self {
            registry,
            scale,
            trades,
            quote_volume,
            fees_collected,
            trade_size,
            price,
            rejected,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn whole_units(&self, amount: u128) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let units = amount as f64 / 10f64.powi(self.scale.decimals() as i32);
        units
    }
}

impl EventSink for MetricsRegistry {
    fn on_trade(&self, event: &TradeEvent) {
        let fill = &event.fill;
        let market = fill.market_id.to_string();
        let action = fill.action.to_string();
        self.trades
            .with_label_values(&[&market, &action, &fill.side.to_string()])
            .inc();
        self.quote_volume
            .with_label_values(&[&market, &action])
            .inc_by(self.whole_units(fill.quote_amount));
        self.fees_collected
            .with_label_values(&[&market])
            .inc_by(self.whole_units(fill.fee));
        self.trade_size
            .with_label_values(&[&market])
            .observe(self.whole_units(fill.tokens));
    }

    fn on_price(&self, update: &PriceUpdate) {
        self.price
            .with_label_values(&[&update.market_id.to_string(), &update.position_id.to_string()])
            .set(update.price.to_f64());
    }

    fn on_rejected(&self, market: MarketId, error: &EngineError) {
        self.rejected
            .with_label_values(&[&market.to_string(), error.category()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixed_point::{WAD, Wad};
    use crate::domain::trade::{Fill, Side, TradeSide};

    fn event() -> TradeEvent {
        TradeEvent {
            id: uuid::Uuid::new_v4(),
            fill: Fill {
                trader: "alice".to_string(),
                market_id: 4,
                position_id: 2,
                side: Side::Lay,
                action: TradeSide::Buy,
                tokens: 2_000_000,
                quote_amount: 1_500_000,
                fee: 15_000,
            },
            timestamp: 0,
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_trade_updates_counters() {
        let metrics = MetricsRegistry::new(QuoteScale::new(6)).unwrap();
        metrics.on_trade(&event());
        metrics.on_trade(&event());
        assert_eq!(metrics.trades.with_label_values(&["4", "BUY", "LAY"]).get(), 2);
        let volume = metrics.quote_volume.with_label_values(&["4", "BUY"]).get();
        assert!((volume - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_and_rejections_rendered() {
        let metrics = MetricsRegistry::new(QuoteScale::new(6)).unwrap();
        metrics.on_price(&PriceUpdate {
            market_id: 4,
            position_id: 2,
            price: Wad::from_raw(WAD / 4),
            timestamp: 0,
        });
        metrics.on_rejected(4, &EngineError::DustTrade);
        let text = metrics.render().unwrap();
        assert!(text.contains("lmsr_engine_position_price{market=\"4\",position=\"2\"} 0.25"));
        assert!(text.contains("lmsr_engine_trades_rejected_total{category=\"domain\",market=\"4\"} 1"));
    }
}
