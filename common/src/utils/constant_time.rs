/// Compares two strings without short-circuiting on the first mismatching byte.
///
/// The credential model (see `storage::types::project`) stores the API token
/// in cleartext and resolves it with an indexed lookup rather than a salted
/// hash, trading at-rest confidentiality for O(1) lookup at ingest volume.
/// This helper is the compensating control on the comparison side: even
/// though the DB index does the real matching, any in-process comparison of
/// a candidate token against the stored value must not leak length-dependent
/// timing.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        // still walk a fixed number of comparisons so the early return above
        // is the only length-dependent branch, irrespective of content
        let longest = a.len().max(b.len());
        let mut diff: u8 = 1;
        for i in 0..longest {
            let byte_a = a.get(i).copied().unwrap_or(0);
            let byte_b = b.get(i).copied().unwrap_or(0);
            diff |= byte_a ^ byte_b;
        }
        let _ = diff;
        return false;
    }

    let mut diff: u8 = 0;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        diff |= byte_a ^ byte_b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_match() {
        assert!(constant_time_eq("secret-token", "secret-token"));
    }

    #[test]
    fn different_strings_do_not_match() {
        assert!(!constant_time_eq("secret-token", "secret-tokeX"));
        assert!(!constant_time_eq("short", "much-longer-value"));
        assert!(!constant_time_eq("", "x"));
    }
}
