//! Splits a source blob into top-level expressions without reading them.
//!
//! The scan tracks paren depth, whether it is inside a string literal, and
//! whether the next string character is escaped. An expression ends when
//! depth returns to zero outside a string. A bare atom at depth zero ends at
//! the next whitespace, so `(define x 1) x` yields two expressions. Leftover
//! non-blank text is emitted at the end even if unbalanced; the reader then
//! reports it.

const PREFIX_CHARS: &[char] = &['\'', '`', ',', '@', '#'];

#[derive(Default)]
struct Scanner {
    expressions: Vec<String>,
    current: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    fn emit(&mut self) {
        let text = self.current.trim();
        if !text.is_empty() {
            self.expressions.push(text.to_string());
        }
        self.current.clear();
    }

    // Text at depth zero that is more than quote prefixes, e.g. `foo` or `'x`.
    fn holds_bare_atom(&self) -> bool {
        let text = self.current.trim();
        !text.is_empty() && !text.chars().all(|c| PREFIX_CHARS.contains(&c))
    }
}

pub fn segment(source: &str) -> Vec<String> {
    let mut s = Scanner::default();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if s.in_string {
            s.current.push(c);
            if s.escaped {
                s.escaped = false;
            } else if c == '\\' {
                s.escaped = true;
            } else if c == '"' {
                s.in_string = false;
                if s.depth == 0 && chars.peek().map_or(true, |n| n.is_whitespace()) {
                    s.emit();
                }
            }
            continue;
        }

        match c {
            ';' => {
                // line comment; keep the newline as a separator
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                if s.depth == 0 && s.holds_bare_atom() {
                    s.emit();
                } else {
                    s.current.push('\n');
                }
            }
            '"' => {
                s.in_string = true;
                s.current.push(c);
            }
            '#' if chars.peek() == Some(&'\\') => {
                // character literal: `#\(` must not count as a paren
                s.current.push(c);
                if let Some(backslash) = chars.next() {
                    s.current.push(backslash);
                }
                if let Some(literal) = chars.next() {
                    s.current.push(literal);
                }
            }
            '(' | '[' => {
                if s.depth == 0 && s.holds_bare_atom() {
                    s.emit();
                }
                s.depth += 1;
                s.current.push(c);
            }
            ')' | ']' => {
                s.current.push(c);
                if s.depth > 0 {
                    s.depth -= 1;
                }
                if s.depth == 0 {
                    s.emit();
                }
            }
            c if c.is_whitespace() => {
                if s.depth == 0 && s.holds_bare_atom() {
                    s.emit();
                } else {
                    s.current.push(c);
                }
            }
            _ => s.current.push(c),
        }
    }

    s.emit();
    s.expressions
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_top_level_forms_in_order() {
        assert_eq!(segment("(+ 1 2) (* 3 4)"), vec!["(+ 1 2)", "(* 3 4)"]);
    }

    #[test]
    fn empty_and_blank_sources_yield_nothing() {
        assert!(segment("").is_empty());
        assert!(segment("  \n\t ").is_empty());
    }

    #[test]
    fn parens_inside_strings_do_not_count() {
        assert_eq!(
            segment("(display \"(not-a-call)\")"),
            vec!["(display \"(not-a-call)\")"]
        );
    }

    #[test]
    fn escaped_quotes_stay_inside_the_string() {
        assert_eq!(
            segment(r#"(display "say \"(hi\"") (newline)"#),
            vec![r#"(display "say \"(hi\"")"#, "(newline)"]
        );
    }

    #[test]
    fn multi_line_definitions_are_one_expression() {
        let source = "(define (square x)\n  (* x x))\n\n(square 4)\n";
        assert_eq!(
            segment(source),
            vec!["(define (square x)\n  (* x x))", "(square 4)"]
        );
    }

    #[test]
    fn bare_atoms_are_separate_expressions() {
        assert_eq!(segment("(define x 5) x 42"), vec!["(define x 5)", "x", "42"]);
        assert_eq!(segment("\"hello\" 1"), vec!["\"hello\"", "1"]);
    }

    #[test]
    fn quote_prefixes_stay_attached() {
        assert_eq!(segment("'(1 2) 'sym `(a ,b)"), vec!["'(1 2)", "'sym", "`(a ,b)"]);
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            segment("; header\n(+ 1 2) ; trailing ) paren\n(+ 3 4)"),
            vec!["(+ 1 2)", "(+ 3 4)"]
        );
    }

    #[test]
    fn character_literals_do_not_count_as_parens() {
        assert_eq!(segment("(list #\\( #\\)) 1"), vec!["(list #\\( #\\))", "1"]);
    }

    #[test]
    fn unbalanced_trailing_text_is_emitted() {
        assert_eq!(segment("(+ 1 2) (+ 3"), vec!["(+ 1 2)", "(+ 3"]);
    }

    #[test]
    fn segmenting_is_idempotent_per_expression() {
        for expression in segment("(define (f x) (* x 2)) (f 21) 'done") {
            assert_eq!(segment(&expression), vec![expression.clone()]);
        }
    }
}
