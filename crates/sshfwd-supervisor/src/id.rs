//! Tunnel identifier generation

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of identifiers assigned to new tunnels
pub const ID_LENGTH: usize = 16;

/// Generate a random identifier of exactly `len` characters drawn from
/// `[A-Za-z0-9]`.
///
/// Uniqueness is not guaranteed; callers check against existing ids.
pub fn generate_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_lengths() {
        for len in [0, 1, 2, 16, 64, 1000] {
            let id = generate_id(len);
            assert_eq!(id.len(), len);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{}", id);
        }
    }

    #[test]
    fn test_generate_id_independent() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id(ID_LENGTH)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
