//! ECMAScript number serialization.
//!
//! Numbers are written exactly as `Number.prototype.toString()` would write
//! them: the shortest digit string that round-trips to the same double, laid
//! out in decimal notation for magnitudes in `[1e-6, 1e21)` and in exponent
//! notation otherwise.
//!
//! The shortest digits come from Rust's `{:e}` formatting, which is exact
//! and shortest round-trip for every finite double.

use crate::error::{ErrorCode, JcsResult};

/// Format a double per ECMAScript rules. NaN and Infinity are rejected.
pub fn format_f64(value: f64) -> JcsResult<String> {
    if !value.is_finite() {
        return Err(ErrorCode::E200_NonFiniteNumber);
    }
    if value == 0.0 {
        // Covers -0 as well
        return Ok("0".to_string());
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .ok_or(ErrorCode::E200_NonFiniteNumber)?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| ErrorCode::E200_NonFiniteNumber)?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::with_capacity(digits.len() + 8);
    if value < 0.0 {
        out.push('-');
    }
    layout(&digits, exponent + 1, &mut out);
    Ok(out)
}

/// Lay out significant `digits` with decimal point position `n`
/// (the value is `0.digits * 10^n`).
fn layout(digits: &str, n: i32, out: &mut String) {
    let k = digits.len() as i32;
    if k <= n && n <= 21 {
        out.push_str(digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let e = n - 1;
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    }
}

/// Validate a JSON number literal and return its double value.
///
/// Grammar: `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`. Literals that
/// overflow to infinity are rejected.
pub fn parse_lexical(text: &str) -> JcsResult<f64> {
    if !is_json_number(text.as_bytes()) {
        return Err(ErrorCode::E104_InvalidNumber(text.to_string()));
    }
    let value: f64 = text
        .parse()
        .map_err(|_| ErrorCode::E104_InvalidNumber(text.to_string()))?;
    if !value.is_finite() {
        return Err(ErrorCode::E104_InvalidNumber(text.to_string()));
    }
    Ok(value)
}

fn is_json_number(b: &[u8]) -> bool {
    let mut i = 0;
    if b.first() == Some(&b'-') {
        i += 1;
    }
    match b.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => {
            while matches!(b.get(i), Some(b'0'..=b'9')) {
                i += 1;
            }
        }
        _ => return false,
    }
    if b.get(i) == Some(&b'.') {
        i += 1;
        let start = i;
        while matches!(b.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    if matches!(b.get(i), Some(b'e') | Some(b'E')) {
        i += 1;
        if matches!(b.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }
        let start = i;
        while matches!(b.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == b.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(v: f64) -> String {
        format_f64(v).unwrap()
    }

    #[test]
    fn test_zero_and_integers() {
        assert_eq!(fmt(0.0), "0");
        assert_eq!(fmt(-0.0), "0");
        assert_eq!(fmt(1.0), "1");
        assert_eq!(fmt(-123.0), "-123");
        assert_eq!(fmt(9007199254740991.0), "9007199254740991");
        assert_eq!(fmt(1e20), "100000000000000000000");
    }

    #[test]
    fn test_fractions() {
        assert_eq!(fmt(0.1), "0.1");
        assert_eq!(fmt(123.456), "123.456");
        assert_eq!(fmt(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(fmt(4.35), "4.35");
        assert_eq!(fmt(-0.5), "-0.5");
        assert_eq!(fmt(0.000001), "0.000001");
    }

    #[test]
    fn test_exponent_notation() {
        assert_eq!(fmt(1e21), "1e+21");
        assert_eq!(fmt(1e-7), "1e-7");
        assert_eq!(fmt(1.5e-7), "1.5e-7");
        assert_eq!(fmt(5e-324), "5e-324");
        assert_eq!(fmt(f64::MAX), "1.7976931348623157e+308");
        assert_eq!(fmt(-1.2345e30), "-1.2345e+30");
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(format_f64(f64::NAN), Err(ErrorCode::E200_NonFiniteNumber));
        assert_eq!(format_f64(f64::INFINITY), Err(ErrorCode::E200_NonFiniteNumber));
        assert_eq!(
            format_f64(f64::NEG_INFINITY),
            Err(ErrorCode::E200_NonFiniteNumber)
        );
    }

    #[test]
    fn test_lexical_grammar() {
        assert!(parse_lexical("0").is_ok());
        assert!(parse_lexical("-0.0e+5").is_ok());
        assert!(parse_lexical("12.5E-3").is_ok());
        for bad in ["01", "1.", ".5", "+1", "1e", "1e+", "--1", "0x10", ""] {
            assert!(parse_lexical(bad).is_err(), "{bad} should be rejected");
        }
        assert!(matches!(
            parse_lexical("1e400"),
            Err(ErrorCode::E104_InvalidNumber(_))
        ));
    }

    #[test]
    fn test_parse_then_format_is_shortest() {
        for text in ["0.1", "1e+21", "123.456", "5e-324", "0.000001"] {
            assert_eq!(fmt(parse_lexical(text).unwrap()), text);
        }
        assert_eq!(fmt(parse_lexical("1.0").unwrap()), "1");
        assert_eq!(fmt(parse_lexical("1E3").unwrap()), "1000");
    }
}
