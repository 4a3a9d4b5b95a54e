//! Package version ordering
//!
//! Good enough to pick the newest of several installed kernel packages. It is
//! not a full dpkg/rpm comparator.

use std::cmp::Ordering;

/// Compare two package versions
///
/// An optional `epoch:` prefix is compared first. A `~` segment sorts before
/// anything else, so `1.0~rc1` is older than `1.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_rest) = split_epoch(a);
    let (b_epoch, b_rest) = split_epoch(b);
    if a_epoch != b_epoch {
        return a_epoch.cmp(&b_epoch);
    }

    let a_parts = parse_version_parts(a_rest);
    let b_parts = parse_version_parts(b_rest);
    let max_len = a_parts.len().max(b_parts.len());

    for i in 0..max_len {
        let a_part = a_parts.get(i).cloned().unwrap_or(VersionPart::Numeric(0));
        let b_part = b_parts.get(i).cloned().unwrap_or(VersionPart::Numeric(0));

        let ord = match (a_part, b_part) {
            (VersionPart::Tilde, VersionPart::Tilde) => Ordering::Equal,
            (VersionPart::Tilde, _) => Ordering::Less,
            (_, VersionPart::Tilde) => Ordering::Greater,
            (VersionPart::Numeric(a_num), VersionPart::Numeric(b_num)) => a_num.cmp(&b_num),
            (VersionPart::Alpha(a_str), VersionPart::Alpha(b_str)) => a_str.cmp(&b_str),
            (VersionPart::Numeric(_), VersionPart::Alpha(_)) => Ordering::Less,
            (VersionPart::Alpha(_), VersionPart::Numeric(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) => match epoch.parse::<u64>() {
            Ok(n) => (n, rest),
            Err(_) => (0, version),
        },
        None => (0, version),
    }
}

#[derive(Debug, Clone)]
enum VersionPart {
    Numeric(u64),
    Alpha(String),
    Tilde,
}

fn parse_version_parts(version: &str) -> Vec<VersionPart> {
    let mut parts = Vec::new();
    let mut current_num = String::new();
    let mut current_alpha = String::new();

    fn flush(parts: &mut Vec<VersionPart>, num: &mut String, alpha: &mut String) {
        if !num.is_empty() {
            if let Ok(n) = num.parse::<u64>() {
                parts.push(VersionPart::Numeric(n));
            }
            num.clear();
        }
        if !alpha.is_empty() {
            parts.push(VersionPart::Alpha(alpha.clone()));
            alpha.clear();
        }
    }

    for c in version.chars() {
        if c.is_ascii_digit() {
            if !current_alpha.is_empty() {
                flush(&mut parts, &mut current_num, &mut current_alpha);
            }
            current_num.push(c);
        } else if c.is_alphabetic() {
            if !current_num.is_empty() {
                flush(&mut parts, &mut current_num, &mut current_alpha);
            }
            current_alpha.push(c);
        } else {
            flush(&mut parts, &mut current_num, &mut current_alpha);
            if c == '~' {
                parts.push(VersionPart::Tilde);
            }
        }
    }
    flush(&mut parts, &mut current_num, &mut current_alpha);

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compare() {
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.1", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(
            compare_versions("5.15.0-91-generic", "5.15.0-101-generic"),
            Ordering::Less
        );
    }

    #[test]
    fn test_epoch_wins() {
        assert_eq!(compare_versions("1:1.0", "2.0"), Ordering::Greater);
        assert_eq!(compare_versions("0:3.10.0", "3.10.0"), Ordering::Equal);
    }

    #[test]
    fn test_tilde_sorts_first() {
        assert_eq!(compare_versions("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0~rc1"), Ordering::Greater);
    }
}
