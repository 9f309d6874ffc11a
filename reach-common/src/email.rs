//! Recipient address validation
//!
//! Campaign recipients are checked for basic mailbox shape before any row is
//! written: a non-empty local part, a single `@`, and a dotted domain. Full
//! RFC 5321 parsing is deliberately out of scope; the transport is the final
//! authority on deliverability.

/// Check whether `address` looks like a deliverable mailbox.
///
/// Accepts `local@domain` where the local part is non-empty and free of
/// whitespace, and the domain contains at least one interior dot. Leading and
/// trailing whitespace is rejected; callers are expected to trim first.
#[must_use]
pub fn is_valid_recipient(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }

    if domain.contains('@') || domain.chars().any(char::is_whitespace) {
        return false;
    }

    // The domain needs a dot with a non-empty label on each side.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}
