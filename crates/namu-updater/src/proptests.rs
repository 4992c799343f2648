//! Property-based tests for namu-updater.
//!
//! # Properties Tested
//!
//! - Property 1: Version ordering is a total order
//! - Property 2: Trailing zeros never change a comparison
//! - Property 3: Strict and lenient parsing agree on well-formed input
//! - Property 4: Package checksum verification

#![cfg(test)]

use std::cmp::Ordering;
use std::io::Write;

use proptest::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::integrity::verify_sha256;
use crate::version::{compare, is_newer, Version};

// =============================================================================
// Generators
// =============================================================================

/// Generate a version with one to five components.
fn arb_version() -> impl Strategy<Value = Version> {
    prop::collection::vec(0u64..50, 1..5).prop_map(Version::new)
}

/// Generate a well-formed version string, optionally `v`-prefixed.
fn arb_version_string() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        prop::collection::vec(0u64..10_000, 1..5),
    )
        .prop_map(|(prefixed, parts)| {
            let dotted = parts
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(".");
            if prefixed {
                format!("v{}", dotted)
            } else {
                dotted
            }
        })
}

/// Generate package content (1 byte to 8KB).
fn arb_package_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..8192)
}

fn write_temp(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// Property 1: Version ordering is a total order
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_compare_is_antisymmetric(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
    }

    #[test]
    fn prop_compare_is_transitive(
        a in arb_version(),
        b in arb_version(),
        c in arb_version()
    ) {
        if compare(&a, &b) != Ordering::Greater && compare(&b, &c) != Ordering::Greater {
            prop_assert_ne!(compare(&a, &c), Ordering::Greater);
        }
    }

    #[test]
    fn prop_is_newer_matches_compare(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(is_newer(&a, &b), compare(&a, &b) == Ordering::Greater);
        prop_assert!(!(is_newer(&a, &b) && is_newer(&b, &a)));
    }

    #[test]
    fn prop_version_never_newer_than_itself(a in arb_version()) {
        prop_assert!(!a.is_newer_than(&a));
    }
}

// =============================================================================
// Property 2: Trailing zeros never change a comparison
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_zero_padding_is_equal(a in arb_version(), zeros in 0usize..4) {
        let mut padded = a.components().to_vec();
        padded.extend(std::iter::repeat(0).take(zeros));
        let padded = Version::new(padded);

        prop_assert_eq!(compare(&a, &padded), Ordering::Equal);
        prop_assert_eq!(&a, &padded);
    }

    #[test]
    fn prop_bumping_any_component_is_newer(a in arb_version(), index in 0usize..5) {
        let mut bumped = a.components().to_vec();
        let index = index % bumped.len();
        bumped[index] += 1;
        prop_assert!(Version::new(bumped).is_newer_than(&a));
    }
}

// =============================================================================
// Property 3: Strict and lenient parsing agree on well-formed input
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_strict_and_lenient_agree(raw in arb_version_string()) {
        let strict = Version::parse_strict(&raw).unwrap();
        let lenient = Version::parse(&raw);
        prop_assert_eq!(&strict, &lenient);
        prop_assert_eq!(strict.components(), lenient.components());
    }

    #[test]
    fn prop_display_reparses_to_equal(a in arb_version()) {
        prop_assert_eq!(Version::parse_strict(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn prop_lenient_parse_never_panics(raw in "\\PC{0,24}") {
        let _ = Version::parse(&raw);
    }
}

// =============================================================================
// Property 4: Package checksum verification
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_correct_checksum_accepted(content in arb_package_content()) {
        let file = write_temp(&content);
        let expected = hex::encode(Sha256::digest(&content));
        prop_assert!(verify_sha256(file.path(), &expected).is_ok());
    }

    #[test]
    fn prop_modified_content_rejected(
        content in arb_package_content(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255
    ) {
        let expected = hex::encode(Sha256::digest(&content));
        let mut tampered = content.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;

        let file = write_temp(&tampered);
        prop_assert!(verify_sha256(file.path(), &expected).is_err());
    }
}
