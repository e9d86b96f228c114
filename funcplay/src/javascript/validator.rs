//! Textual pre-filter applied before a submission reaches V8.
//!
//! This is a deterrent against obvious misuse, not an isolation boundary:
//! the isolate itself (no host ops, pruned globals, watchdog, heap ceiling)
//! is what actually contains a submission.

use once_cell::sync::Lazy;
use regex::Regex;

use super::SandboxError;

/// `(pattern, what it catches)` in reporting order.
static DENYLIST: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\beval\s*\(", "eval()"),
        (r"\bFunction\s*\(", "the Function constructor"),
        (r"\bimport\s*\(", "dynamic import()"),
        (r"\brequire\s*\(", "require()"),
        (r"\bprocess\.", "the process object"),
        (r"\bglobal\.", "the global object"),
        (r"\bwindow\.", "the window object"),
        (r"\bdocument\.", "the document object"),
        (r"\bfetch\s*\(", "fetch()"),
        (r"\bXMLHttpRequest\b", "XMLHttpRequest"),
        (r"\bwhile\s*\(.*\btrue\b.*\)", "a while(true) loop"),
        (r"\bfor\s*\(.*;;.*\)", "an unbounded for(;;) loop"),
    ]
    .into_iter()
    .map(|(pattern, description)| (Regex::new(pattern).unwrap(), description))
    .collect()
});

/// Reject oversized sources and sources matching a denylisted construct.
pub fn validate_code(code: &str, max_code_size: usize) -> Result<(), SandboxError> {
    if code.len() > max_code_size {
        return Err(SandboxError::CodeTooLarge {
            size: code.len(),
            max: max_code_size,
        });
    }
    for (pattern, description) in DENYLIST.iter() {
        if pattern.is_match(code) {
            return Err(SandboxError::Rejected {
                construct: description,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str) -> bool {
        matches!(
            validate_code(code, 64 * 1024),
            Err(SandboxError::Rejected { .. })
        )
    }

    #[test]
    fn rejects_denylisted_constructs() {
        assert!(rejected("eval('1+1')"));
        assert!(rejected("new Function('return 1')()"));
        assert!(rejected("import('fs')"));
        assert!(rejected("const fs = require('fs')"));
        assert!(rejected("process.exit(1)"));
        assert!(rejected("global.x = 1"));
        assert!(rejected("window.location"));
        assert!(rejected("document.body"));
        assert!(rejected("fetch('http://example.com')"));
        assert!(rejected("new XMLHttpRequest()"));
        assert!(rejected("while(true){}"));
        assert!(rejected("while (running === true) { step(); }"));
        assert!(rejected("for(;;){}"));
    }

    #[test]
    fn accepts_ordinary_code() {
        assert!(validate_code("function sum(a, b) { return a + b; }", 1024).is_ok());
        assert!(validate_code("console.log(1+1); 2+2", 1024).is_ok());
        assert!(validate_code("for (let i = 0; i < 3; i++) {}", 1024).is_ok());
        assert!(validate_code("let i = 0; while (i < 3) { i++; }", 1024).is_ok());
    }

    #[test]
    fn identifiers_containing_denylisted_words_pass() {
        assert!(validate_code("function retrieval(x) { return x; } retrieval(1)", 1024).is_ok());
        assert!(validate_code("const myFunction = (x) => x; myFunction(2)", 1024).is_ok());
        assert!(validate_code("globalThis.Math.max(1, 2)", 1024).is_ok());
        assert!(validate_code("const prefetch = (x) => x; prefetch(3)", 1024).is_ok());
    }

    #[test]
    fn rejects_oversized_code() {
        let err = validate_code(&"1;".repeat(600), 1000).unwrap_err();
        assert!(matches!(err, SandboxError::CodeTooLarge { size: 1200, max: 1000 }));
    }
}
