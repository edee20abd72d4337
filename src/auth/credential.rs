//! Shared-secret comparison
//!
//! The caller's password is compared against the configured one without any
//! early exit, so response timing does not reveal where the strings diverge.

/// Compare a caller-supplied secret with the configured secret in constant time
///
/// Both sides are raw bytes: header values are not required to be UTF-8 or
/// ASCII. A missing caller secret should be passed as empty. When the lengths
/// differ the result is always `false`, but the full length of `expected` is
/// still walked; only length equality is observable through timing.
pub fn verify_secret(provided: &[u8], expected: &[u8]) -> bool {
    compare(provided, expected).0
}

/// Returns the match result and the number of byte pairs folded into it
fn compare(provided: &[u8], expected: &[u8]) -> (bool, usize) {
    let mut diff = u8::from(provided.len() != expected.len());
    let mut steps = 0;

    for (i, &e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(!e);
        diff |= p ^ e;
        steps += 1;
    }

    (std::hint::black_box(diff) == 0, steps)
}
