use sha2::{Digest, Sha256};

/// Hex SHA-256 of `parts`, each fed in order with a `:` separator.
pub fn digest_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            hasher.update(b":");
        }
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_keeps_parts_apart() {
        assert_ne!(
            digest_parts(&[b"ab".as_slice(), b"c".as_slice()]),
            digest_parts(&[b"a".as_slice(), b"bc".as_slice()])
        );
        assert_eq!(digest_parts(&[b"abc".as_slice()]).len(), 64);
    }
}
