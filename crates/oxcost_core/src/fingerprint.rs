use sha2::{Digest, Sha256};

use crate::types::ImportDeclaration;

/// Order-independent digest of the canonical import strings in a buffer.
///
/// Sorting before hashing makes the fingerprint a function of the multiset
/// of imports: two buffers that differ only in import order, binding order,
/// or surrounding code produce the same fingerprint. Duplicate declarations
/// contribute twice.
pub fn fingerprint(declarations: &[ImportDeclaration]) -> String {
    let mut strings: Vec<&str> = declarations.iter().map(|d| d.string.as_str()).collect();
    strings.sort_unstable();

    let mut hasher = Sha256::new();
    for s in &strings {
        hasher.update(s.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn decl(string: &str) -> ImportDeclaration {
        ImportDeclaration {
            name: "x".to_string(),
            line: 1,
            string: string.to_string(),
            file_name: PathBuf::from("/project/src/index.js"),
        }
    }

    #[test]
    fn test_order_independent() {
        let a = [decl("import \"chai\";"), decl("import \"ora\";")];
        let b = [decl("import \"ora\";"), decl("import \"chai\";")];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_different_sets_differ() {
        let a = [decl("import \"chai\";")];
        let b = [decl("import \"ora\";")];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_duplicates_count() {
        let once = [decl("import \"chai\";")];
        let twice = [decl("import \"chai\";"), decl("import \"chai\";")];
        assert_ne!(fingerprint(&once), fingerprint(&twice));
    }

    #[test]
    fn test_empty_is_stable() {
        assert_eq!(fingerprint(&[]), fingerprint(&[]));
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        let a = [decl("ab"), decl("c")];
        let b = [decl("a"), decl("bc")];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
