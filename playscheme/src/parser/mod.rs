use pest::iterators::Pair;
use pest::Parser;

use crate::runtime::values::Value;

pub mod errors;

pub use errors::{Location, ParseError, ParseResult};
use errors::invalid_literal;

// Define the parser struct using the grammar file
#[derive(pest_derive::Parser)]
#[grammar = "scheme.pest"] // Path relative to src/
pub struct SchemeParser;

/// Deepest bracket nesting the reader accepts; the grammar recurses per level.
pub const MAX_NESTING: usize = 512;

/// Read every datum in `input`, in source order.
pub fn parse_program(input: &str) -> ParseResult<Vec<Value>> {
    if nesting_depth(input) > MAX_NESTING {
        return Err(ParseError::TooDeep(MAX_NESTING));
    }
    // Room for MAX_NESTING levels of grammar recursion on any thread.
    stacker::maybe_grow(4 * 1024 * 1024, 16 * 1024 * 1024, || read_program(input))
}

fn read_program(input: &str) -> ParseResult<Vec<Value>> {
    let mut pairs = SchemeParser::parse(Rule::program, input)?;
    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_datum)
        .collect()
}

// Bracket depth outside strings, line comments and character literals.
fn nesting_depth(input: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            ';' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '#' => {
                if chars.clone().next() == Some('\\') {
                    chars.nth(1);
                }
            }
            '(' | '[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Read exactly one datum.
pub fn parse_datum(input: &str) -> ParseResult<Value> {
    let mut data = parse_program(input)?;
    if data.len() != 1 {
        return Err(ParseError::DatumCount(data.len()));
    }
    Ok(data.remove(0))
}

fn build_datum(pair: Pair<Rule>) -> ParseResult<Value> {
    match pair.as_rule() {
        Rule::boolean => Ok(Value::Boolean(matches!(pair.as_str(), "#t" | "#true"))),
        Rule::character => build_character(pair),
        Rule::string => build_string(pair),
        Rule::number => build_number(pair),
        Rule::symbol => Ok(Value::symbol(pair.as_str())),
        Rule::quoted => build_prefixed("quote", pair),
        Rule::quasiquoted => build_prefixed("quasiquote", pair),
        Rule::unquoted => build_prefixed("unquote", pair),
        Rule::unquote_splicing => build_prefixed("unquote-splicing", pair),
        Rule::list => build_list(pair),
        other => Err(ParseError::UnexpectedRule(format!("{:?}", other))),
    }
}

fn build_prefixed(keyword: &str, pair: Pair<Rule>) -> ParseResult<Value> {
    let location = errors::location_of(&pair);
    let inner = pair.into_inner().next().ok_or(ParseError::Syntax {
        message: format!("{} prefix without a datum", keyword),
        location,
    })?;
    Ok(Value::list(vec![Value::symbol(keyword), build_datum(inner)?]))
}

fn build_list(pair: Pair<Rule>) -> ParseResult<Value> {
    let location = errors::location_of(&pair);
    let mut items = Vec::new();
    let mut tail = Value::Nil;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::dotted_tail {
            let location = errors::location_of(&inner);
            let datum = inner.into_inner().next().ok_or(ParseError::Syntax {
                message: "dot without a tail datum".to_string(),
                location,
            })?;
            tail = build_datum(datum)?;
        } else {
            items.push(build_datum(inner)?);
        }
    }
    if items.is_empty() && !tail.is_nil() {
        return Err(ParseError::Syntax {
            message: "dotted pair needs a head".to_string(),
            location,
        });
    }
    Ok(Value::list_with_tail(items, tail))
}

fn build_number(pair: Pair<Rule>) -> ParseResult<Value> {
    let text = pair.as_str();
    let looks_real = text.contains(['.', 'e', 'E']);
    if !looks_real {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Integer(n));
        }
    }
    // Integers too large for i64 are read inexactly.
    text.parse::<f64>()
        .map(Value::Real)
        .map_err(|e| invalid_literal(&pair, e.to_string()))
}

fn build_character(pair: Pair<Rule>) -> ParseResult<Value> {
    let body = &pair.as_str()[2..];
    let mut chars = body.chars();
    let c = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => match body {
            "space" => ' ',
            "newline" | "linefeed" => '\n',
            "tab" => '\t',
            "return" => '\r',
            "nul" | "null" => '\0',
            "alarm" => '\u{7}',
            "backspace" => '\u{8}',
            "delete" => '\u{7f}',
            "escape" => '\u{1b}',
            _ => return Err(invalid_literal(&pair, "unknown character name")),
        },
    };
    Ok(Value::Char(c))
}

fn build_string(pair: Pair<Rule>) -> ParseResult<Value> {
    let raw = pair
        .clone()
        .into_inner()
        .next()
        .map(|p| p.as_str())
        .unwrap_or("");
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\u{7}'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => return Err(invalid_literal(&pair, format!("unknown escape \\{}", other))),
            None => return Err(invalid_literal(&pair, "dangling escape")),
        }
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_atoms() {
        assert_eq!(parse_datum("42").unwrap(), Value::Integer(42));
        assert_eq!(parse_datum("-7").unwrap(), Value::Integer(-7));
        assert_eq!(parse_datum("2.5").unwrap(), Value::Real(2.5));
        assert_eq!(parse_datum("#t").unwrap(), Value::Boolean(true));
        assert_eq!(parse_datum("#false").unwrap(), Value::Boolean(false));
        assert_eq!(parse_datum("#\\a").unwrap(), Value::Char('a'));
        assert_eq!(parse_datum("#\\space").unwrap(), Value::Char(' '));
        assert_eq!(parse_datum("foo-bar?").unwrap(), Value::symbol("foo-bar?"));
    }

    #[test]
    fn operator_symbols_are_not_numbers() {
        assert_eq!(parse_datum("+").unwrap(), Value::symbol("+"));
        assert_eq!(parse_datum("-").unwrap(), Value::symbol("-"));
        assert_eq!(parse_datum("1+").unwrap(), Value::symbol("1+"));
        assert_eq!(parse_datum("...").unwrap(), Value::symbol("..."));
    }

    #[test]
    fn reads_string_escapes() {
        assert_eq!(
            parse_datum(r#""a\"b\n""#).unwrap(),
            Value::String("a\"b\n".to_string())
        );
    }

    #[test]
    fn reads_quote_prefixes() {
        let quoted = parse_datum("'(1 2)").unwrap();
        assert_eq!(quoted.to_string(), "(quote (1 2))");
        let spliced = parse_datum("`(a ,b ,@c)").unwrap();
        assert_eq!(
            spliced.to_string(),
            "(quasiquote (a (unquote b) (unquote-splicing c)))"
        );
    }

    #[test]
    fn reads_dotted_pairs() {
        let pair = parse_datum("(1 . 2)").unwrap();
        assert_eq!(pair.to_string(), "(1 . 2)");
        let improper = parse_datum("(1 2 . 3)").unwrap();
        assert_eq!(improper.to_string(), "(1 2 . 3)");
    }

    #[test]
    fn skips_comments() {
        let program = parse_program("; leading\n(+ 1 2) #| block |# 3").unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn unbalanced_input_is_a_syntax_error() {
        let err = parse_program("(+ 1 2").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn parse_datum_rejects_multiple_data() {
        assert_eq!(parse_datum("1 2").unwrap_err(), ParseError::DatumCount(2));
    }

    #[test]
    fn excessive_nesting_is_refused() {
        let deep = format!("{}{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(parse_program(&deep).unwrap_err(), ParseError::TooDeep(MAX_NESTING));

        let fine = format!("{}{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_program(&fine).is_ok());
        assert!(parse_program("\"((((((\" #\\( ; ((((\n(a)").is_ok());
    }
}
