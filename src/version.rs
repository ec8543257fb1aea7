//! Package version ordering following pacman's `vercmp`.
//!
//! Versions have the shape `[epoch:]pkgver[-pkgrel]`. The epoch is compared
//! first, then pkgver, then pkgrel when both sides carry one. Each part is
//! ordered with `alpm_types::Pkgver`.

use alpm_types::PackageVersion as Pkgver;
use log::debug;
use std::cmp::Ordering;

/// A version string split into its epoch, pkgver and pkgrel parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Evr<'a> {
    epoch: &'a str,
    version: &'a str,
    release: Option<&'a str>,
}

impl<'a> Evr<'a> {
    fn parse(evr: &'a str) -> Self {
        let digits = evr.bytes().take_while(|b| b.is_ascii_digit()).count();
        let (epoch, rest) = if evr.as_bytes().get(digits) == Some(&b':') {
            let epoch = &evr[..digits];
            (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
        } else {
            ("0", evr)
        };
        match rest.rfind('-') {
            Some(pos) => Evr {
                epoch,
                version: &rest[..pos],
                release: Some(&rest[pos + 1..]),
            },
            None => Evr {
                epoch,
                version: rest,
                release: None,
            },
        }
    }
}

pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let left = Evr::parse(a);
    let right = Evr::parse(b);

    part_cmp(left.epoch, right.epoch)
        .then_with(|| part_cmp(left.version, right.version))
        .then_with(|| match (left.release, right.release) {
            (Some(l), Some(r)) => part_cmp(l, r),
            _ => Ordering::Equal,
        })
}

/// True when `candidate` sorts strictly after `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    vercmp(candidate, current) == Ordering::Greater
}

// A part alpm-types rejects sorts before any valid one.
fn part_cmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (Pkgver::new(a.to_string()), Pkgver::new(b.to_string())) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(e)) => {
            debug!("Unparsable version part '{}': {}", b, e);
            Ordering::Greater
        }
        (Err(e), Ok(_)) => {
            debug!("Unparsable version part '{}': {}", a, e);
            Ordering::Less
        }
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evr() {
        assert_eq!(
            Evr::parse("2:1.0.3-4"),
            Evr {
                epoch: "2",
                version: "1.0.3",
                release: Some("4")
            }
        );
        assert_eq!(
            Evr::parse("1.0"),
            Evr {
                epoch: "0",
                version: "1.0",
                release: None
            }
        );
        assert_eq!(Evr::parse(":1.0-1").epoch, "0");
        assert_eq!(Evr::parse("1.0-rc1-2").version, "1.0-rc1");
    }

    #[test]
    fn test_basic_ordering() {
        assert_eq!(vercmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(vercmp("2.0", "1.0"), Ordering::Greater);
        assert_eq!(vercmp("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(vercmp("1.001", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_alpha_segments() {
        assert_eq!(vercmp("1.0a", "1.0"), Ordering::Less);
        assert_eq!(vercmp("1.0", "1.0a"), Ordering::Greater);
        assert_eq!(vercmp("1.0alpha", "1.0beta"), Ordering::Less);
        assert_eq!(vercmp("1.0rc1", "1.0"), Ordering::Less);
        assert_eq!(vercmp("1.0.a", "1.0.1"), Ordering::Less);
        assert_eq!(vercmp("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_separators() {
        assert_eq!(vercmp("1.0", "1_0"), Ordering::Equal);
        assert_eq!(vercmp("1.0.1", "1_0_0"), Ordering::Greater);
    }

    #[test]
    fn test_unparsable_parts_sort_first() {
        assert_eq!(vercmp("-1", "1.0-1"), Ordering::Less);
        assert_eq!(vercmp("1.0-1", "-1"), Ordering::Greater);
    }

    #[test]
    fn test_epoch_and_release() {
        assert_eq!(vercmp("1:1.0-1", "2.0-1"), Ordering::Greater);
        assert_eq!(vercmp("0:2.0-1", "2.0-1"), Ordering::Equal);
        assert_eq!(vercmp("1.0-1", "1.0-2"), Ordering::Less);
        assert_eq!(vercmp("1.0-10", "1.0-9"), Ordering::Greater);
        // pkgrel only breaks ties when both sides have one
        assert_eq!(vercmp("1.0", "1.0-5"), Ordering::Equal);
    }

    #[test]
    fn test_reflexive_and_antisymmetric() {
        let versions = [
            "1.0", "1.0-1", "1.0a", "1.0.1", "2:0.1", "1.0rc1", "1.0.0-2", "20240101", "1.a.2",
        ];
        for a in versions {
            assert_eq!(vercmp(a, a), Ordering::Equal);
            for b in versions {
                assert_eq!(vercmp(a, b), vercmp(b, a).reverse(), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("2.0-1", "1.9-3"));
        assert!(!is_newer("1.0-1", "1.0-1"));
        assert!(!is_newer("1.0-1", "1.0-2"));
    }
}
