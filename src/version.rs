//! Version ordering and item-reference parsing (C1).
//!
//! A version string is split on `.`; each dot-segment is split again on digit
//! runs, producing a mixed sequence of integer and string tokens that compares
//! numerically where both sides are numbers and lexically otherwise.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(u64),
    Str(String),
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Num(a), Token::Num(b)) => a.cmp(b),
            (Token::Str(a), Token::Str(b)) => a.cmp(b),
            // Mismatched types fall back to lexical comparison of their string forms.
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Splits a version string into its comparison key: a sequence of tokens.
fn version_keys(version: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for segment in version.split('.') {
        let mut chars = segment.chars().peekable();
        let mut buf = String::new();
        let mut in_digits = false;
        let mut first = true;
        while let Some(c) = chars.next() {
            let is_digit = c.is_ascii_digit();
            if !first && is_digit != in_digits {
                push_token(&mut tokens, &buf, in_digits);
                buf.clear();
            }
            buf.push(c);
            in_digits = is_digit;
            first = false;
        }
        if !buf.is_empty() {
            push_token(&mut tokens, &buf, in_digits);
        }
    }
    tokens
}

fn push_token(tokens: &mut Vec<Token>, buf: &str, is_digits: bool) {
    if is_digits {
        match buf.parse::<u64>() {
            Ok(n) => tokens.push(Token::Num(n)),
            Err(_) => tokens.push(Token::Str(buf.to_string())),
        }
    } else {
        tokens.push(Token::Str(buf.to_string()));
    }
}

/// Compares two version strings. Returns `Less` if `a < b`, etc.
///
/// (P1) `compare(a, b) == compare(b, a).reverse()`, `compare(a, a) == Equal`, and the
/// relation is transitive, since it reduces to a lexicographic comparison of `Token`
/// sequences and `Token: Ord`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    version_keys(a).cmp(&version_keys(b))
}

/// The relational operator in an item reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Ge => ">=",
            Op::Gt => ">",
            Op::Le => "<=",
            Op::Lt => "<",
            Op::Eq => "==",
        };
        write!(f, "{s}")
    }
}

/// A parsed `[cookbook:]name[op version]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub cookbook: Option<String>,
    pub name: String,
    pub constraint: Option<(Op, String)>,
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cookbook) = &self.cookbook {
            write!(f, "{cookbook}:")?;
        }
        write!(f, "{}", self.name)?;
        if let Some((op, version)) = &self.constraint {
            write!(f, "{op}{version}")?;
        }
        Ok(())
    }
}

/// The relational operators, tried longest-first so `>=`/`<=` are not shadowed by `>`/`<`.
const OPERATORS: &[(&str, Op)] = &[
    (">=", Op::Ge),
    ("<=", Op::Le),
    (">", Op::Gt),
    ("<", Op::Lt),
    ("==", Op::Eq),
    ("=", Op::Eq),
    ("@", Op::Eq),
    ("-", Op::Eq),
];

impl ItemRef {
    /// Parses `[cookbook ":"] name [ op version ]`. Whitespace around `:` and `op` is
    /// ignored. No operator and no version means "any version, any cookbook."
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut rest = input;

        let cookbook = if let Some(idx) = rest.find(':') {
            let (cb, tail) = rest.split_at(idx);
            let cb = cb.trim();
            if cb.is_empty() {
                None
            } else {
                rest = tail[1..].trim_start();
                Some(cb.to_string())
            }
        } else {
            None
        };

        let mut found: Option<(&str, Op)> = None;
        for (token, op) in OPERATORS {
            if let Some(idx) = rest.find(token) {
                match found {
                    Some((_, _)) if rest.find(found.unwrap().0).unwrap() <= idx => {}
                    _ => found = Some((token, *op)),
                }
            }
        }
        // Prefer the earliest-occurring, longest-matching operator in the string.
        let mut best: Option<(usize, &str, Op)> = None;
        for (token, op) in OPERATORS {
            if let Some(idx) = rest.find(token) {
                let better = match best {
                    None => true,
                    Some((bidx, btoken, _)) => {
                        idx < bidx || (idx == bidx && token.len() > btoken.len())
                    }
                };
                if better {
                    best = Some((idx, token, *op));
                }
            }
        }
        let _ = found;

        if let Some((idx, token, op)) = best {
            let name = rest[..idx].trim().to_string();
            let version = rest[idx + token.len()..].trim().to_string();
            if name.is_empty() {
                return Err(format!("empty item name in reference '{input}'"));
            }
            Ok(ItemRef {
                cookbook,
                name,
                constraint: Some((op, version)),
            })
        } else {
            let name = rest.trim().to_string();
            if name.is_empty() {
                return Err(format!("empty item name in reference '{input}'"));
            }
            Ok(ItemRef {
                cookbook,
                name,
                constraint: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use test_case::test_case;

    #[test_case("1.0.2g", "1.1.1a", Ordering::Less; "dotted semver-like with trailing letters")]
    #[test_case("0.101.0_1", "0.102.0_0", Ordering::Less; "underscore suffix segments")]
    #[test_case("1.0.0", "1.0.0", Ordering::Equal; "identical versions")]
    #[test_case("2.0", "1.9.9", Ordering::Greater; "major version wins")]
    #[test_case("1.2", "1.10", Ordering::Less; "numeric comparison not lexical")]
    fn compares_as_expected(a: &str, b: &str, expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn compare_is_antisymmetric_and_reflexive() {
        let pairs = [("1.0.2g", "1.1.1a"), ("3.4.5", "3.4.5"), ("9.0", "10.0")];
        for (a, b) in pairs {
            assert_eq!(compare_versions(a, a), Ordering::Equal);
            assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse());
        }
    }

    #[test]
    fn parses_bare_name() {
        let r = ItemRef::parse("meepioux").unwrap();
        assert_eq!(r.cookbook, None);
        assert_eq!(r.name, "meepioux");
        assert_eq!(r.constraint, None);
    }

    #[test]
    fn parses_ge_constraint() {
        let r = ItemRef::parse("blarghus>=1.2.3").unwrap();
        assert_eq!(r.name, "blarghus");
        assert_eq!(r.constraint, Some((Op::Ge, "1.2.3".to_string())));
    }

    #[test]
    fn parses_cookbook_and_eq() {
        let r = ItemRef::parse("scrapbook: minnow < 0.1.12").unwrap();
        assert_eq!(r.cookbook, Some("scrapbook".to_string()));
        assert_eq!(r.name, "minnow");
        assert_eq!(r.constraint, Some((Op::Lt, "0.1.12".to_string())));
    }

    #[test]
    fn parses_at_as_equality() {
        let r = ItemRef::parse("wheeple@0.2.0").unwrap();
        assert_eq!(r.constraint, Some((Op::Eq, "0.2.0".to_string())));
    }

    #[test]
    fn roundtrips_through_display() {
        // (P2) parse-then-print recovers the original components.
        for input in ["meepioux", "blarghus>=1.2.3", "scrapbook:minnow<0.1.12"] {
            let r = ItemRef::parse(input).unwrap();
            assert_eq!(r.to_string(), input.replace(' ', ""));
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert!(ItemRef::parse(">=1.0").is_err());
    }
}
