//! Route-rule table mapping `(method, path)` to the price a request must pay.
//!
//! A single [`X402Middleware`](crate::layer::X402Middleware) can guard many routes at
//! once, each with its own price, instead of the one-price-per-`.layer()` model. Paths
//! are glob-like: a literal run of characters matches itself, `[name]` matches exactly
//! one path segment (the name is unused at match time, it only documents intent), and
//! `*` lazily matches any run of characters, including `/` — so it can stand in for one
//! segment or a whole multi-segment suffix depending on what surrounds it.
//!
//! When more than one rule matches a request, the most specific one wins: more literal
//! text outranks more `[param]` segments, and a pattern with no `*` at all outranks one
//! that has a wildcard.

use http::Method;
use regex::Regex;

use crate::price::PriceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Specificity {
    literal_segments: usize,
    param_segments: usize,
    /// `true` when the pattern has no `*` at all — ranked above any pattern that does.
    no_wildcard: bool,
}

/// One compiled entry in a [`RouteTable`].
#[derive(Clone)]
struct Rule {
    method: Option<Method>,
    pattern: String,
    regex: Regex,
    specificity: Specificity,
    price: PriceSpec,
}

/// Ordered set of [`Rule`]s a middleware consults for each incoming request.
#[derive(Default, Clone)]
pub struct RouteTable {
    rules: Vec<Rule>,
}

/// A pattern failed to compile into a matcher.
#[derive(Debug, thiserror::Error)]
#[error("invalid route pattern {pattern:?}: {reason}")]
pub struct RoutePatternError {
    pattern: String,
    reason: String,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a price for requests matching `method` (or any method, if `None`) and
    /// `pattern`.
    pub fn add_rule(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        price: PriceSpec,
    ) -> Result<(), RoutePatternError> {
        let (regex, specificity) = compile_pattern(pattern)?;
        self.rules.push(Rule {
            method,
            pattern: pattern.to_string(),
            regex,
            specificity,
            price,
        });
        Ok(())
    }

    /// Builder-style variant of [`RouteTable::add_rule`].
    pub fn with_rule(mut self, method: Option<Method>, pattern: &str, price: PriceSpec) -> Self {
        self.add_rule(method, pattern, price)
            .unwrap_or_else(|e| panic!("{e}"));
        self
    }

    /// Returns the most specific rule whose method and path both match, if any.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&PriceSpec> {
        self.rules
            .iter()
            .filter(|rule| rule.method.as_ref().is_none_or(|m| m == method))
            .filter(|rule| rule.regex.is_match(path))
            .max_by_key(|rule| rule.specificity)
            .map(|rule| &rule.price)
    }

    /// True if no rule would ever match this path regardless of method — used to let
    /// unprotected routes skip the paygate entirely.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[cfg(test)]
    fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.pattern.as_str()).collect()
    }
}

/// Compiles a glob-like pattern into an anchored regex: a literal run of characters
/// matches itself, `[name]` becomes `[^/]+` (exactly one path segment), and `*`
/// becomes `.*?` (lazy, may span any number of segments).
fn compile_pattern(pattern: &str) -> Result<(Regex, Specificity), RoutePatternError> {
    let mut literal_segments = 0;
    let mut param_segments = 0;
    let mut has_wildcard = false;
    let mut regex_src = String::from("^");
    let mut literal_run = String::new();

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                flush_literal_run(&mut literal_run, &mut regex_src, &mut literal_segments);
                has_wildcard = true;
                regex_src.push_str(".*?");
            }
            '[' => {
                let mut name = String::new();
                let mut closed = false;
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        closed = true;
                        break;
                    }
                    name.push(c2);
                }
                if !closed || name.is_empty() {
                    return Err(RoutePatternError {
                        pattern: pattern.to_string(),
                        reason: "unterminated or empty `[name]` parameter".to_string(),
                    });
                }
                flush_literal_run(&mut literal_run, &mut regex_src, &mut literal_segments);
                param_segments += 1;
                regex_src.push_str("[^/]+");
            }
            other => literal_run.push(other),
        }
    }
    flush_literal_run(&mut literal_run, &mut regex_src, &mut literal_segments);
    regex_src.push('$');

    let regex = Regex::new(&regex_src).map_err(|e| RoutePatternError {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok((
        regex,
        Specificity {
            literal_segments,
            param_segments,
            no_wildcard: !has_wildcard,
        },
    ))
}

fn flush_literal_run(buf: &mut String, regex_src: &mut String, literal_segments: &mut usize) {
    if !buf.is_empty() {
        regex_src.push_str(&regex::escape(buf));
        *literal_segments += 1;
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::PriceSpec;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::Asset;

    fn price(amount: &str) -> PriceSpec {
        PriceSpec::new(Network::StellarTestnet, Asset::Native, amount, "GPAYTO")
    }

    #[test]
    fn literal_route_beats_wildcard_route() {
        let table = RouteTable::new()
            .with_rule(None, "/reports/[id]", price("100"))
            .with_rule(None, "/reports/annual", price("500"));
        let resolved = table.resolve(&Method::GET, "/reports/annual").unwrap();
        assert_eq!(resolved.max_amount_required, "500");
    }

    #[test]
    fn method_restricted_rule_does_not_match_other_methods() {
        let table = RouteTable::new().with_rule(Some(Method::POST), "/submit", price("10"));
        assert!(table.resolve(&Method::GET, "/submit").is_none());
        assert!(table.resolve(&Method::POST, "/submit").is_some());
    }

    #[test]
    fn wildcard_matches_multi_segment_suffix() {
        let table = RouteTable::new().with_rule(None, "/files/*", price("1"));
        assert!(table.resolve(&Method::GET, "/files/a/b/c.png").is_some());
    }

    #[test]
    fn literal_route_beats_wildcard_route_on_specificity() {
        let table = RouteTable::new()
            .with_rule(None, "/a/*", price("1"))
            .with_rule(None, "/a/b", price("2"));
        let resolved = table.resolve(&Method::GET, "/a/b").unwrap();
        assert_eq!(resolved.max_amount_required, "2");
    }

    #[test]
    fn non_matching_path_returns_none() {
        let table = RouteTable::new().with_rule(None, "/reports/[id]", price("100"));
        assert!(table.resolve(&Method::GET, "/other").is_none());
    }

    #[test]
    fn patterns_are_stored_in_insertion_order() {
        let table = RouteTable::new()
            .with_rule(None, "/a", price("1"))
            .with_rule(None, "/b", price("2"));
        assert_eq!(table.patterns(), vec!["/a", "/b"]);
    }
}
