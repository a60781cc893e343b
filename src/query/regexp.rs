//! REGEXP predicate installed into the storage engine
//!
//! Malformed or oversized patterns match nothing; they never fail the query.

use regex::{Regex, RegexBuilder};
use std::cell::RefCell;

const REGEX_SIZE_LIMIT: usize = 1 << 20;

thread_local! {
    // Last compiled pattern; a scan evaluates the same pattern for every row.
    static LAST: RefCell<Option<(String, Option<Regex>)>> = const { RefCell::new(None) };
}

/// `(pattern, value) -> matched`
pub fn regex_matches(pattern: &str, value: &str) -> bool {
    LAST.with(|cell| {
        let mut last = cell.borrow_mut();
        let stale = !matches!(last.as_ref(), Some((p, _)) if p == pattern);
        if stale {
            let compiled = RegexBuilder::new(pattern)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .ok();
            *last = Some((pattern.to_string(), compiled));
        }
        match last.as_ref() {
            Some((_, Some(re))) => re.is_match(value),
            _ => false,
        }
    })
}
