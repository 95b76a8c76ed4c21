//! Market-data tool catalogue.
//!
//! A closed set of named tools with declared input/output schemas. Agents
//! whose registry entry lists a tool get its schema rendered into their
//! prompt; the LLM client realises the actual call within the agent's own
//! turn against whatever implements [`MarketData`].

use crate::provider::{FieldKind, SchemaDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One declared tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input: SchemaDescriptor,
    pub output: SchemaDescriptor,
}

/// A point-in-time quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub as_of: DateTime<Utc>,
}

/// One daily bar of price history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryBar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Headline fundamentals for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub dividend_yield_pct: Option<f64>,
    pub market_cap: Option<f64>,
    pub eps: Option<f64>,
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("market data transport error: {0}")]
    Transport(String),
}

/// The consumed market-data interface.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    async fn get_history(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Vec<HistoryBar>, MarketDataError>;

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError>;
}

fn symbol_input(name: &str) -> SchemaDescriptor {
    SchemaDescriptor::new(name).field("symbol", "ticker symbol", FieldKind::Text, true)
}

/// The closed tool catalogue.
pub static MARKET_TOOLS: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    vec![
        ToolSpec {
            name: "get_quote",
            description: "Latest price and daily change for one symbol",
            input: symbol_input("get_quote_input"),
            output: SchemaDescriptor::new("get_quote_output")
                .field("price", "last traded price", FieldKind::Number { min: None, max: None }, true)
                .field("change", "absolute daily change", FieldKind::Number { min: None, max: None }, true)
                .field(
                    "change_pct",
                    "percentage daily change",
                    FieldKind::Number { min: None, max: None },
                    true,
                )
                .field("as_of", "RFC 3339 timestamp", FieldKind::Text, true),
        },
        ToolSpec {
            name: "get_history",
            description: "Daily OHLC bars for one symbol",
            input: symbol_input("get_history_input").field(
                "days",
                "lookback window in days",
                FieldKind::Number {
                    min: Some(1.0),
                    max: Some(3650.0),
                },
                true,
            ),
            output: SchemaDescriptor::new("get_history_output").field(
                "bars",
                "list of date/open/high/low/close rows",
                FieldKind::TextList,
                true,
            ),
        },
        ToolSpec {
            name: "get_fundamentals",
            description: "Headline fundamentals (P/E, yield, market cap, EPS)",
            input: symbol_input("get_fundamentals_input"),
            output: SchemaDescriptor::new("get_fundamentals_output")
                .field("pe_ratio", "price/earnings", FieldKind::Number { min: None, max: None }, false)
                .field(
                    "dividend_yield_pct",
                    "trailing dividend yield",
                    FieldKind::Number { min: None, max: None },
                    false,
                )
                .field("market_cap", "market capitalisation", FieldKind::Number { min: None, max: None }, false)
                .field("eps", "earnings per share", FieldKind::Number { min: None, max: None }, false),
        },
    ]
});

/// Look up one tool by name.
pub fn tool(name: &str) -> Option<&'static ToolSpec> {
    MARKET_TOOLS.iter().find(|t| t.name == name)
}

/// Render the named tools as a prompt section. Unknown names are skipped;
/// an empty selection renders nothing.
pub fn render_tools(names: &[&str]) -> String {
    let specs: Vec<&ToolSpec> = names.iter().filter_map(|n| tool(n)).collect();
    if specs.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Available tools\n\n");
    for spec in specs {
        out.push_str(&format!("### {} — {}\n", spec.name, spec.description));
        out.push_str("Input:\n");
        out.push_str(&spec.input.instructions());
        out.push('\n');
    }
    out
}
