//! Content-hash anchors shared by `repo.read` and `repo.edit` (spec §4.4).

use sha1::{Digest, Sha1};

/// First 6 hex chars of the SHA-1 of a single line's content, used to
/// validate anchored edits without a full diff.
pub fn line_anchor(line: &str) -> String {
    let digest = Sha1::digest(line.as_bytes());
    hex::encode(digest)[..6].to_string()
}

/// Full SHA-1 hex digest of a file's bytes, used for `baseHash`/`fileHash`
/// whole-file comparisons.
pub fn file_hash(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_spec_example() {
        assert_eq!(line_anchor("const x = 1;"), "749b17");
    }
}
