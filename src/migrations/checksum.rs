//! # Migration Checksum
//!
//! CRC32 checksums let the loader notice a migration script that was edited
//! after it was generated. The `checksum:` line itself is excluded from the
//! checksummed content so a script can carry its own checksum.

use crc32fast::Hasher;

const PREFIX: &str = "crc32:";
const CHECKSUM_KEY: &str = "checksum:";

/// Compute the checksum of `content`, formatted as `crc32:XXXXXXXX`.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    format!("{}{:08X}", PREFIX, hasher.finalize())
}

/// Checksum of a script file, ignoring its top-level `checksum:` line and
/// line endings. Nested `checksum:` keys are content.
pub fn checksum_for_script(content: &str) -> String {
    let without_checksum = content
        .lines()
        .filter(|line| !line.starts_with(CHECKSUM_KEY))
        .collect::<Vec<_>>()
        .join("\n");

    compute_checksum(&without_checksum)
}

/// Compare a declared checksum with the script it was declared in.
///
/// Hex digits compare case-insensitively.
pub fn verify_script(content: &str, declared: &str) -> Result<(), String> {
    let actual = checksum_for_script(content);
    match (parse_checksum(declared), parse_checksum(&actual)) {
        (Some(expected), Some(computed)) if expected == computed => Ok(()),
        _ => Err(actual),
    }
}

/// Extract the numeric value from `crc32:XXXXXXXX`.
pub fn parse_checksum(formatted: &str) -> Option<u32> {
    let hex = formatted.trim().strip_prefix(PREFIX)?;
    if hex.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum_format() {
        let checksum = compute_checksum("test");
        assert!(checksum.starts_with("crc32:"));
        assert_eq!(checksum.len(), 6 + 8);
        assert_eq!(checksum, compute_checksum("test"));
    }

    #[test]
    fn test_script_checksum_ignores_checksum_line() {
        let with_line = "name: users\nchecksum: \"crc32:DEADBEEF\"\nup: []\n";
        let without_line = "name: users\nup: []";
        assert_eq!(checksum_for_script(with_line), compute_checksum(without_line));
    }

    #[test]
    fn test_verify_script() {
        let body = "name: users\nup: []\n";
        let declared = checksum_for_script(body);
        let script = format!("name: users\nchecksum: \"{}\"\nup: []\n", declared);
        assert!(verify_script(&script, &declared).is_ok());
        assert!(verify_script(&script, &declared.to_lowercase()).is_ok());

        let tampered = script.replace("users", "accounts");
        let actual = verify_script(&tampered, &declared).unwrap_err();
        assert_ne!(actual, declared);
    }

    #[test]
    fn test_nested_checksum_key_is_covered() {
        let body = "name: backfill\nup:\n  - raw:\n      operation:\n        checksum: \"sha256:aaaa\"\n";
        let declared = checksum_for_script(body);
        let script = format!("checksum: \"{}\"\n{}", declared, body);
        assert!(verify_script(&script, &declared).is_ok());

        let tampered = script.replace("sha256:aaaa", "sha256:bbbb");
        assert!(verify_script(&tampered, &declared).is_err());
    }

    #[test]
    fn test_parse_checksum() {
        assert_eq!(parse_checksum("crc32:ABC12345"), Some(0xABC12345));
        assert!(parse_checksum("md5:ABC12345").is_none());
        assert!(parse_checksum("ABC12345").is_none());
        assert!(parse_checksum("crc32:ABC").is_none());
    }
}
