//! # Expr — Numeric and Range Expression Parsing
//!
//! The CLI accepts big numbers the way people write them: `10^12`, `1e6`,
//! `1,000,000`, and sums like `10e100 + 10e9`. This module turns those
//! into `rug::Integer` values and parses the range shorthands
//! `L,R` / `[L,R]` / `range[L,R]` / `L..R` / `L:R`.
//!
//! Grammar:
//! ```text
//! Expr    := Term ('+' Term)*
//! Term    := Decimal | Decimal '^' Decimal | Decimal ('e'|'E') Decimal
//! Decimal := digits | digits(,digits)+   (groups of 3 after a first 1-3)
//! ```

use rug::ops::Pow;
use rug::Integer;

use crate::EngineError;

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidInput(msg.into())
}

/// Parse a numeric expression into a non-negative big integer.
pub fn parse_expr(s: &str) -> Result<Integer, EngineError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(invalid("empty numeric expression"));
    }
    let mut total = Integer::new();
    for term in s.split('+') {
        total += parse_term(term.trim())?;
    }
    Ok(total)
}

fn parse_term(t: &str) -> Result<Integer, EngineError> {
    if t.is_empty() {
        return Err(invalid("empty term in numeric expression"));
    }
    if let Some((base, exp)) = t.split_once('^') {
        let base = parse_decimal(base.trim())?;
        let exp = parse_exponent(exp.trim())?;
        return Ok(base.pow(exp));
    }
    if let Some(pos) = t.find(['e', 'E']) {
        let (base, exp) = t.split_at(pos);
        let base = parse_decimal(base.trim())?;
        let exp = parse_exponent(exp[1..].trim())?;
        return Ok(base * Integer::from(10u32).pow(exp));
    }
    parse_decimal(t)
}

/// Exponents must be plain decimals that fit u32.
fn parse_exponent(e: &str) -> Result<u32, EngineError> {
    let v = parse_decimal(e)?;
    v.to_u32()
        .ok_or_else(|| invalid(format!("exponent {} out of range", v)))
}

fn parse_decimal(d: &str) -> Result<Integer, EngineError> {
    if d.is_empty() {
        return Err(invalid("empty decimal"));
    }
    let digits: String = if d.contains(',') {
        let groups: Vec<&str> = d.split(',').collect();
        let first = groups[0];
        if first.is_empty() || first.len() > 3 || !first.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!("malformed grouped decimal '{}'", d)));
        }
        for g in &groups[1..] {
            if g.len() != 3 || !g.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("malformed grouped decimal '{}'", d)));
            }
        }
        groups.concat()
    } else {
        if !d.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!("'{}' is not a decimal", d)));
        }
        d.to_string()
    };
    Integer::parse(digits.as_str())
        .map(Integer::from)
        .map_err(|_| invalid(format!("unparseable decimal '{}'", d)))
}

/// Parse a range expression into (L, R) with L ≤ R.
///
/// The bare comma form is ambiguous against grouped decimals
/// (`1,000,2,000`); the parser tries each comma as the separator and
/// takes the first split where both sides parse and L ≤ R.
pub fn parse_range(s: &str) -> Result<(Integer, Integer), EngineError> {
    let s = s.trim();
    let inner = if let Some(rest) = s.strip_prefix("range") {
        strip_brackets(rest.trim())?
    } else if s.starts_with('[') {
        strip_brackets(s)?
    } else {
        s
    };

    if let Some((l, r)) = inner.split_once("..") {
        return finish_range(parse_expr(l)?, parse_expr(r)?);
    }
    if let Some((l, r)) = inner.split_once(':') {
        return finish_range(parse_expr(l)?, parse_expr(r)?);
    }

    // Bare comma form: probe each comma as the separator.
    let bytes = inner.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b',' {
            continue;
        }
        let (l, r) = (&inner[..i], &inner[i + 1..]);
        if let (Ok(lv), Ok(rv)) = (parse_expr(l), parse_expr(r)) {
            if lv <= rv {
                return Ok((lv, rv));
            }
        }
    }
    Err(invalid(format!("unparseable range expression '{}'", s)))
}

fn strip_brackets(s: &str) -> Result<&str, EngineError> {
    s.strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| invalid(format!("expected [L,R] in '{}'", s)))
}

fn finish_range(l: Integer, r: Integer) -> Result<(Integer, Integer), EngineError> {
    if l > r {
        return Err(invalid(format!("range bounds out of order: {} > {}", l, r)));
    }
    Ok((l, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(s: &str) -> Integer {
        parse_expr(s).unwrap()
    }

    #[test]
    fn plain_decimals() {
        assert_eq!(expr("0"), 0);
        assert_eq!(expr("42"), 42);
        assert_eq!(expr("  1000000  "), 1_000_000);
    }

    #[test]
    fn grouped_decimals() {
        assert_eq!(expr("1,000,000"), 1_000_000);
        assert_eq!(expr("12,345"), 12_345);
        assert_eq!(expr("999"), 999);
        assert!(parse_expr("1,00").is_err());
        assert!(parse_expr("1,0000").is_err());
        assert!(parse_expr(",000").is_err());
        assert!(parse_expr("1234,567").is_err());
    }

    #[test]
    fn powers_and_scientific() {
        assert_eq!(expr("10^6"), 1_000_000);
        assert_eq!(expr("2^10"), 1024);
        assert_eq!(expr("1e6"), 1_000_000);
        assert_eq!(expr("1E3"), 1000);
        assert_eq!(expr("10e100"), Integer::from(10u32) * Integer::from(10u32).pow(100));
    }

    #[test]
    fn sums_of_terms() {
        assert_eq!(expr("10^6 + 10^3"), 1_001_000);
        assert_eq!(
            expr("10e100 + 10e9"),
            Integer::from(10u32) * Integer::from(10u32).pow(100)
                + Integer::from(10_000_000_000u64)
        );
        assert_eq!(expr("1+2+3"), 6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("abc").is_err());
        assert!(parse_expr("10^").is_err());
        assert!(parse_expr("^4").is_err());
        assert!(parse_expr("1.5").is_err());
        assert!(parse_expr("-3").is_err());
        assert!(parse_expr("2^2^2").is_err()); // no nested exponents
    }

    #[test]
    fn range_forms() {
        let expect = (Integer::from(10u32), Integer::from(100u32));
        assert_eq!(parse_range("10,100").unwrap(), expect);
        assert_eq!(parse_range("[10,100]").unwrap(), expect);
        assert_eq!(parse_range("range[10,100]").unwrap(), expect);
        assert_eq!(parse_range("10..100").unwrap(), expect);
        assert_eq!(parse_range("10:100").unwrap(), expect);
    }

    #[test]
    fn range_with_expressions() {
        let (l, r) = parse_range("10^6..10^6 + 1000").unwrap();
        assert_eq!(l, 1_000_000);
        assert_eq!(r, 1_001_000);
    }

    #[test]
    fn range_comma_disambiguation() {
        // Both sides grouped: the only split that parses both sides with
        // L ≤ R is between the groups.
        let (l, r) = parse_range("1,000,2,000").unwrap();
        assert_eq!(l, 1000);
        assert_eq!(r, 2000);
        let (l, r) = parse_range("1,000,000,2,000,000").unwrap();
        assert_eq!(l, 1_000_000);
        assert_eq!(r, 2_000_000);
    }

    #[test]
    fn range_rejects_reversed_and_garbage() {
        assert!(parse_range("100..10").is_err());
        assert!(parse_range("100,10").is_err());
        assert!(parse_range("[100,10]").is_err());
        assert!(parse_range("").is_err());
        assert!(parse_range("range[10,100").is_err());
        assert!(parse_range("10").is_err());
    }
}
