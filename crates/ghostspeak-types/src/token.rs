//! Token metadata and base-unit amount codec
//!
//! Every monetary value in GhostSpeak is a `u64` count of *base units*, the
//! indivisible denomination of its token. Human-readable strings are produced
//! and parsed with the token's declared decimals, using exact integer
//! arithmetic (no floating point anywhere on the money path).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{GhostSpeakError, Result};

/// Largest decimals value whose scale factor fits in a `u64`
pub const MAX_DECIMALS: u8 = 19;

/// Tokens the protocol knows how to hold in escrow or stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Native SOL
    Sol,
    /// USD Coin
    Usdc,
    /// Tether
    Usdt,
    /// Protocol token used for staking and voting weight
    Ghost,
}

impl TokenKind {
    /// Ticker symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Sol => "SOL",
            Self::Usdc => "USDC",
            Self::Usdt => "USDT",
            Self::Ghost => "GHOST",
        }
    }

    /// Declared on-ledger precision
    pub fn decimals(&self) -> u8 {
        match self {
            Self::Sol => 9,
            Self::Usdc | Self::Usdt | Self::Ghost => 6,
        }
    }

    /// Whether this is a stable (fiat-pegged) token
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Usdc | Self::Usdt)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Token metadata carried alongside an amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Which token
    pub kind: TokenKind,
    /// Mint address on the current network (`None` for native SOL or when not yet configured)
    pub mint: Option<String>,
    /// Decimal precision of the base unit
    pub decimals: u8,
}

impl TokenInfo {
    /// Metadata with the token's standard precision and no mint
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            mint: None,
            decimals: kind.decimals(),
        }
    }

    /// Attach a mint address
    pub fn with_mint(mut self, mint: impl Into<String>) -> Self {
        self.mint = Some(mint.into());
        self
    }

    /// Format base units for display
    pub fn format(&self, units: u64) -> String {
        format!("{} {}", format_amount(units, self.decimals), self.kind)
    }

    /// Parse a human-readable amount into base units
    pub fn parse(&self, text: &str) -> Result<u64> {
        parse_amount(text, self.decimals)
    }
}

/// Per-network token table
///
/// Replaces a process-wide "current network" lookup: callers hand the table
/// to whatever needs token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTable {
    tokens: BTreeMap<TokenKind, TokenInfo>,
}

impl TokenTable {
    /// An empty table
    pub fn empty() -> Self {
        Self {
            tokens: BTreeMap::new(),
        }
    }

    /// Register or replace a token
    pub fn insert(&mut self, info: TokenInfo) {
        self.tokens.insert(info.kind, info);
    }

    /// Look up a token
    pub fn get(&self, kind: TokenKind) -> Result<&TokenInfo> {
        self.tokens
            .get(&kind)
            .ok_or_else(|| GhostSpeakError::UnknownToken {
                symbol: kind.symbol().to_string(),
            })
    }

    /// All registered tokens, ordered by kind
    pub fn iter(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(TokenInfo::new(TokenKind::Sol));
        table.insert(
            TokenInfo::new(TokenKind::Usdc).with_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        );
        table.insert(
            TokenInfo::new(TokenKind::Usdt).with_mint("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
        );
        table.insert(TokenInfo::new(TokenKind::Ghost));
        table
    }
}

/// Scale factor `10^decimals`
pub fn scale(decimals: u8) -> Result<u64> {
    if decimals > MAX_DECIMALS {
        return Err(GhostSpeakError::invalid_input(
            "decimals",
            format!("at most {} supported, got {}", MAX_DECIMALS, decimals),
        ));
    }
    Ok(10u64.pow(decimals as u32))
}

/// Convert whole tokens to base units
pub fn tokens_to_units(tokens: u64, decimals: u8) -> Result<u64> {
    tokens
        .checked_mul(scale(decimals)?)
        .ok_or(GhostSpeakError::AmountOverflow)
}

/// Render base units as a decimal string, trimming trailing fractional zeros
///
/// `format_amount(1_500_000_000, 9) == "1.5"`, `format_amount(7, 6) == "0.000007"`.
pub fn format_amount(units: u64, decimals: u8) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let decimals = decimals.min(MAX_DECIMALS);
    let factor = 10u64.pow(decimals as u32);
    let whole = units / factor;
    let frac = units % factor;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a decimal string into base units
///
/// Rejects signs, exponents, empty input, more fractional digits than the
/// token supports, and values that overflow `u64`.
pub fn parse_amount(text: &str, decimals: u8) -> Result<u64> {
    let factor = scale(decimals)?;
    let text = text.trim();
    let invalid = |reason: &str| GhostSpeakError::invalid_input("amount", reason.to_string());

    if text.is_empty() {
        return Err(invalid("amount is empty"));
    }

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("amount has no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("amount must contain only digits and one decimal point"));
    }
    if frac.len() > decimals as usize {
        return Err(GhostSpeakError::invalid_input(
            "amount",
            format!("at most {} fractional digits allowed", decimals),
        ));
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .map_err(|_| GhostSpeakError::AmountOverflow)?
            .checked_mul(factor)
            .ok_or(GhostSpeakError::AmountOverflow)?
    };

    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded
            .parse::<u64>()
            .map_err(|_| GhostSpeakError::AmountOverflow)?
    };

    whole_units
        .checked_add(frac_units)
        .ok_or(GhostSpeakError::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_respects_decimals() {
        assert_eq!(format_amount(1_500_000_000, 9), "1.5");
        assert_eq!(format_amount(1_000_000, 6), "1");
        assert_eq!(format_amount(7, 6), "0.000007");
        assert_eq!(format_amount(0, 9), "0");
        assert_eq!(format_amount(42, 0), "42");
    }

    #[test]
    fn test_parse_sol_and_stable() {
        assert_eq!(parse_amount("1.5", 9).unwrap(), 1_500_000_000);
        assert_eq!(parse_amount("1.5", 6).unwrap(), 1_500_000);
        assert_eq!(parse_amount(".25", 6).unwrap(), 250_000);
        assert_eq!(parse_amount("3.", 6).unwrap(), 3_000_000);
        assert_eq!(parse_amount(" 10 ", 6).unwrap(), 10_000_000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_amount("", 6).is_err());
        assert!(parse_amount(".", 6).is_err());
        assert!(parse_amount("-1", 6).is_err());
        assert!(parse_amount("1e6", 6).is_err());
        assert!(parse_amount("1.2.3", 6).is_err());
        // USDC cannot express a seventh fractional digit
        assert!(parse_amount("0.0000001", 6).is_err());
        assert!(matches!(
            parse_amount("18446744073709551616", 0),
            Err(GhostSpeakError::AmountOverflow)
        ));
    }

    #[test]
    fn test_token_table_defaults() {
        let table = TokenTable::default();
        assert_eq!(table.get(TokenKind::Sol).unwrap().decimals, 9);
        assert_eq!(table.get(TokenKind::Usdc).unwrap().decimals, 6);
        assert!(table.get(TokenKind::Usdc).unwrap().mint.is_some());
        assert!(TokenTable::empty().get(TokenKind::Sol).is_err());
    }

    #[test]
    fn test_token_info_display() {
        let sol = TokenInfo::new(TokenKind::Sol);
        assert_eq!(sol.format(2_000_000_000), "2 SOL");
        assert_eq!(sol.parse("0.000000001").unwrap(), 1);
    }

    #[test]
    fn test_tokens_to_units() {
        assert_eq!(tokens_to_units(1_000, 6).unwrap(), 1_000_000_000);
        assert!(tokens_to_units(u64::MAX, 6).is_err());
    }
}
