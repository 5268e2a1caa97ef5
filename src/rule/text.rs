//! Rule-text grammar: the `rules.hyp` line format.
//!
//! ```text
//! rule     := pred ':-' body
//! body     := ε | pred (',' pred)*
//! pred     := symbol '(' args ')'
//! args     := ε | arg (',' arg)*
//! arg      := '?' | variable | symbol
//! variable := 'X' digit+
//! symbol   := [a-z][A-Za-z0-9_]*
//! ```
//!
//! `parse` is deliberately more lenient than the grammar above: besides `?`
//! and `X<n>`, it accepts any bare identifier or integer literal as an
//! argument. An identifier that recurs anywhere else in the rule becomes a
//! limited variable (canonical id assigned by each name's *last*
//! occurrence, scanning head then body left-to-right); one that occurs
//! exactly once collapses to an unbound `?`, since a rule argument with no
//! further context carries no information. An integer literal is always a
//! constant.

use std::collections::HashMap;

use thiserror::Error;

use crate::kb::catalog::Catalog;
use crate::rule::core::{Argument, Predicate};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleTextError {
    #[error("empty rule text")]
    Empty,

    #[error("missing ':-' separator")]
    MissingSeparator,

    #[error("malformed predicate: {0}")]
    MalformedPredicate(String),
}

/// Parses a rule of the informal form demonstrated above, auto-registering
/// any unseen relation symbols in `catalog`.
pub fn parse_rule(
    text: &str,
    catalog: &mut Catalog,
) -> Result<(Predicate, Vec<Predicate>), RuleTextError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RuleTextError::Empty);
    }
    let (head_text, body_text) = text.split_once(":-").ok_or(RuleTextError::MissingSeparator)?;

    let head_pred = split_predicate(head_text)?;
    let body_preds: Vec<(&str, Vec<&str>)> = if body_text.trim().is_empty() {
        Vec::new()
    } else {
        split_body(body_text)?
            .into_iter()
            .map(split_predicate)
            .collect::<Result<_, _>>()?
    };

    let mut lv_ids = assign_canonical_ids(&head_pred, &body_preds);

    let head = build_predicate(&head_pred, &mut lv_ids, catalog);
    let body = body_preds
        .iter()
        .map(|p| build_predicate(p, &mut lv_ids, catalog))
        .collect();

    Ok((head, body))
}

/// Renders `(head, body)` back to the textual form, resolving relation ids
/// through `catalog`.
pub fn rule_to_string(head: &Predicate, body: &[Predicate], catalog: &Catalog) -> String {
    let mut out = String::new();
    out.push_str(&predicate_to_string(head, catalog));
    out.push_str(":-");
    for (i, pred) in body.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&predicate_to_string(pred, catalog));
    }
    out
}

fn predicate_to_string(pred: &Predicate, catalog: &Catalog) -> String {
    let name = catalog
        .relation_name(pred.symbol)
        .map(str::to_owned)
        .unwrap_or_else(|_| format!("r{}", pred.symbol));
    let mut out = format!("{name}(");
    for (i, arg) in pred.args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match arg {
            Argument::Empty => out.push('?'),
            Argument::Variable(v) => out.push_str(&format!("X{v}")),
            Argument::Constant(c) => out.push_str(&c.to_string()),
        }
    }
    out.push(')');
    out
}

fn split_predicate(text: &str) -> Result<(&str, Vec<&str>), RuleTextError> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| RuleTextError::MalformedPredicate(text.to_string()))?;
    if !text.ends_with(')') {
        return Err(RuleTextError::MalformedPredicate(text.to_string()));
    }
    let symbol = text[..open].trim();
    let args_text = &text[open + 1..text.len() - 1];
    let args = if args_text.trim().is_empty() {
        Vec::new()
    } else {
        args_text.split(',').map(str::trim).collect()
    };
    Ok((symbol, args))
}

/// Splits a body's comma-separated predicate list, respecting parens so a
/// predicate's own argument commas aren't mistaken for predicate separators.
fn split_body(text: &str) -> Result<Vec<&str>, RuleTextError> {
    let mut preds = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                preds.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        preds.push(tail);
    }
    if depth != 0 {
        return Err(RuleTextError::MalformedPredicate(text.to_string()));
    }
    Ok(preds)
}

fn explicit_variable_id(token: &str) -> Option<usize> {
    let rest = token.strip_prefix('X')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Assigns canonical ids to every name that recurs (as a non-`?`,
/// non-`X<n>`, non-integer token) anywhere across head+body. Ids are handed
/// out in order of each recurring name's *last* occurrence in the token
/// stream (head then body, left-to-right) — not its first — matching how
/// the reference parser numbers variables while scanning forward and
/// re-numbering a name each time it sees it again.
fn assign_canonical_ids(
    head: &(&str, Vec<&str>),
    body: &[(&str, Vec<&str>)],
) -> HashMap<String, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    let all_args = || {
        head.1
            .iter()
            .chain(body.iter().flat_map(|p| p.1.iter()))
    };
    for (idx, &arg) in all_args().enumerate() {
        if arg == "?" || explicit_variable_id(arg).is_some() || arg.parse::<i32>().is_ok() {
            continue;
        }
        *counts.entry(arg).or_insert(0) += 1;
        last_seen.insert(arg, idx);
    }

    let mut recurring: Vec<&str> = counts
        .into_iter()
        .filter(|&(_, count)| count >= 2)
        .map(|(name, _)| name)
        .collect();
    recurring.sort_by_key(|name| last_seen[name]);

    recurring
        .into_iter()
        .enumerate()
        .map(|(id, name)| (name.to_string(), id))
        .collect()
}

fn build_predicate(
    parsed: &(&str, Vec<&str>),
    lv_ids: &mut HashMap<String, usize>,
    catalog: &mut Catalog,
) -> Predicate {
    let symbol = catalog.register_relation(parsed.0);
    let args = parsed
        .1
        .iter()
        .map(|&token| parse_arg(token, lv_ids))
        .collect();
    Predicate::new(symbol, args)
}

fn parse_arg(token: &str, lv_ids: &HashMap<String, usize>) -> Argument {
    if token == "?" {
        return Argument::Empty;
    }
    if let Some(v) = explicit_variable_id(token) {
        return Argument::Variable(v);
    }
    if let Ok(c) = token.parse::<i32>() {
        return Argument::Constant(c);
    }
    lv_ids
        .get(token)
        .map_or(Argument::Empty, |&v| Argument::Variable(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_variables_pass_through() {
        let mut catalog = Catalog::new();
        let (head, body) = parse_rule("mother(X0,X1):-family(X0,?,X1)", &mut catalog).unwrap();
        assert_eq!(rule_to_string(&head, &body, &catalog), "mother(X0,X1):-family(X0,?,X1)");
    }

    #[test]
    fn numeric_constants_round_trip() {
        let mut catalog = Catalog::new();
        let (head, body) = parse_rule("mother(8,X0):-father(?,X0)", &mut catalog).unwrap();
        assert_eq!(rule_to_string(&head, &body, &catalog), "mother(8,X0):-father(?,X0)");
    }

    #[test]
    fn repeated_names_become_limited_variables() {
        let mut catalog = Catalog::new();
        let (head, body) = parse_rule("p(a,b):-q(a),q(c)", &mut catalog).unwrap();
        assert_eq!(head.args[0], Argument::Variable(0));
        assert_eq!(head.args[1], Argument::Empty);
        assert_eq!(body[0].args[0], Argument::Variable(0));
        assert_eq!(body[1].args[0], Argument::Empty);
    }

    #[test]
    fn canonical_ids_follow_last_occurrence_not_first() {
        // Na recurs at token positions 0 and 4, O3 at 3 and 6, C at 2, 5, 9
        // (scanning head then body left-to-right). Ordered by each name's
        // *last* occurrence: Na (4), O3 (6), C (9) -> Na=X0, O3=X1, C=X2.
        let mut catalog = Catalog::new();
        let (head, body) = parse_rule(
            "compound(Na,H,C,O3):-compound(Na,C,O3),compound(H2,O),compound(C,O2)",
            &mut catalog,
        )
        .unwrap();
        assert_eq!(
            rule_to_string(&head, &body, &catalog),
            "compound(X0,?,X2,X1):-compound(X0,X2,X1),compound(?,?),compound(X2,?)"
        );
    }

    #[test]
    fn empty_body_parses() {
        let mut catalog = Catalog::new();
        let (_, body) = parse_rule("p(?,?):-", &mut catalog).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn missing_separator_is_an_error() {
        let mut catalog = Catalog::new();
        assert_eq!(
            parse_rule("p(?)", &mut catalog),
            Err(RuleTextError::MissingSeparator)
        );
    }
}
