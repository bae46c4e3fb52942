// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Distances between sample barcodes and detection of barcodes that are too
//! close to be demultiplexed safely in the same lane.

use crate::barcode::Barcode;
use bio::alignment::distance::{hamming, levenshtein};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two barcodes of a lane that are closer than the allowed distance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BarcodeCollision {
    pub target: Barcode,
    pub other: Barcode,
    pub distance: u32,
}

impl fmt::Display for BarcodeCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] collides with [{}] (distance = {})",
            self.target.linking_name(),
            self.other.linking_name(),
            self.distance
        )
    }
}

fn segments(barcode: &Barcode) -> [&[u8]; 2] {
    [
        barcode.one().as_bytes(),
        barcode.two().unwrap_or_default().as_bytes(),
    ]
}

/// Levenshtein distance of segment one plus that of segment two. A missing
/// segment two compares as the empty string. Symmetric.
pub fn edit_distance(left: &Barcode, right: &Barcode) -> u32 {
    segments(left)
        .iter()
        .zip(segments(right).iter())
        .map(|(l, r)| levenshtein(l, r))
        .sum()
}

/// Levenshtein distance after truncating `other`'s segments to `target`'s
/// lengths. Not symmetric: a longer `other` that starts with `target` has a
/// similarity of 0, the reverse does not.
pub fn similarity(target: &Barcode, other: &Barcode) -> u32 {
    segments(target)
        .iter()
        .zip(segments(other).iter())
        .map(|(t, o)| levenshtein(t, &o[..o.len().min(t.len())]))
        .sum()
}

/// Hamming distance over the common prefix of each segment, plus the number
/// of bases by which `target` is longer than `other`. Not symmetric.
pub fn truncated_hamming_distance(target: &Barcode, other: &Barcode) -> u32 {
    segments(target)
        .iter()
        .zip(segments(other).iter())
        .map(|(t, o)| {
            let common = t.len().min(o.len());
            let overhang = t.len() - common;
            overhang as u32 + hamming(&t[..common], &o[..common]) as u32
        })
        .sum()
}

/// Every unordered pair of barcodes whose edit distance is below `min_allowed_distance`.
pub fn edit_distance_collisions(
    barcodes: &[Barcode],
    min_allowed_distance: u32,
) -> Vec<BarcodeCollision> {
    let mut collisions = Vec::new();
    for (i, target) in barcodes.iter().enumerate() {
        for other in &barcodes[i + 1..] {
            let distance = edit_distance(target, other);
            if distance < min_allowed_distance {
                collisions.push(BarcodeCollision {
                    target: target.clone(),
                    other: other.clone(),
                    distance,
                });
            }
        }
    }
    collisions
}

/// Every ordered pair of distinct positions whose truncated Hamming distance
/// is below `min_allowed_distance`.
pub fn truncated_hamming_collisions(
    barcodes: &[Barcode],
    min_allowed_distance: u32,
) -> Vec<BarcodeCollision> {
    let mut collisions = Vec::new();
    for (i, target) in barcodes.iter().enumerate() {
        for (j, other) in barcodes.iter().enumerate() {
            if i == j {
                continue;
            }
            let distance = truncated_hamming_distance(target, other);
            if distance < min_allowed_distance {
                collisions.push(BarcodeCollision {
                    target: target.clone(),
                    other: other.clone(),
                    distance,
                });
            }
        }
    }
    collisions
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;

    fn bc(s: &str) -> Barcode {
        s.parse().unwrap()
    }

    fn ed(a: &str, b: &str) -> u32 {
        edit_distance(&bc(a), &bc(b))
    }

    fn th(a: &str, b: &str) -> u32 {
        truncated_hamming_distance(&bc(a), &bc(b))
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(ed("AAAA", "AAAA"), 0);
        assert_eq!(ed("AAAA", "AAAT"), 1);
        assert_eq!(ed("AAAA", "AAAAT"), 1);
        assert_eq!(ed("AAAAT", "AAAA"), 1);
        assert_eq!(ed("ATCGT", "TATCG"), 2);
        assert_eq!(ed("ATCGT", "TATCGG"), 2);
        assert_eq!(ed("ATCGT-AAAAA", "TATCGG-AAAAA"), 2);
        assert_eq!(ed("AAAAA-ATCGT", "AAAAA-TATCGG"), 2);
        assert_eq!(ed("AAAA", "AAAA-TTTT"), 4);
        assert_eq!(ed("AAAA-TTTT", "AAAA"), 4);
        assert_eq!(ed("AAA-TTT", "AAAA-TTTT"), 2);
        assert_eq!(ed("A-TTTT", "AAAA-TTTT"), 3);
        assert_eq!(ed("TTTT", "AAAA-TTTT"), 8);
        assert_eq!(ed("AAAT-TTTA", "AAAA-TTTT"), 2);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(&bc("AAAA"), &bc("AAAAT")), 0);
        assert_eq!(similarity(&bc("AAAAT"), &bc("AAAA")), 1);
        assert_eq!(similarity(&bc("AAAA"), &bc("AAAA-TTTT")), 0);
        assert_eq!(similarity(&bc("AAAA-TTTT"), &bc("AAAA")), 4);
    }

    #[test]
    fn test_truncated_hamming_distance() {
        assert_eq!(th("AAAA", "AAAA"), 0);
        assert_eq!(th("AAAA", "AAAT"), 1);
        assert_eq!(th("AAAA", "AAAAT"), 0);
        assert_eq!(th("AAAAT", "AAAA"), 1);
        assert_eq!(th("ATCGT", "TATCG"), 5);
        assert_eq!(th("ATCGT", "TATCGG"), 5);
        assert_eq!(th("TATCGG", "ATCGT"), 6);
        assert_eq!(th("ATCGT-AAAAA", "TATCGG-AAAAA"), 5);
        assert_eq!(th("TATCGG-AAAAA", "ATCGT-AAAAA"), 6);
        assert_eq!(th("AAAA", "AAAA-TTTT"), 0);
        assert_eq!(th("AAAA-TTTT", "AAAA"), 4);
        assert_eq!(th("AAA-TTT", "AAAA-TTTT"), 0);
        assert_eq!(th("AAAA-TTTT", "AAA-TTT"), 2);
        assert_eq!(th("A-TTTT", "AAAA-TTTT"), 0);
        assert_eq!(th("AAAA-TTTT", "A-TTTT"), 3);
        assert_eq!(th("TTTT", "AAAA-TTTT"), 4);
        assert_eq!(th("AAAA-TTTT", "TTTT"), 8);
        assert_eq!(th("AAAT-TTTA", "AAAA-TTTT"), 2);
    }

    #[test]
    fn test_edit_distance_collisions() {
        let barcodes = vec![bc("AAAAAAAA"), bc("AAAAAAAA"), bc("TTTTTTTT")];
        let collisions = edit_distance_collisions(&barcodes, 1);
        assert_eq!(
            collisions,
            vec![BarcodeCollision {
                target: bc("AAAAAAAA"),
                other: bc("AAAAAAAA"),
                distance: 0,
            }]
        );

        let barcodes = vec![bc("AAAAAAAA"), bc("AAAAAAAT"), bc("TTTTTTTT")];
        assert_eq!(edit_distance_collisions(&barcodes, 1), vec![]);
        assert_eq!(edit_distance_collisions(&barcodes, 2).len(), 1);
        assert_eq!(edit_distance_collisions(&barcodes, 9).len(), 3);
    }

    #[test]
    fn test_truncated_hamming_collisions() {
        let barcodes = vec![bc("AAAA"), bc("AAAAT")];
        let collisions = truncated_hamming_collisions(&barcodes, 1);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].target, bc("AAAA"));
        assert_eq!(collisions[0].other, bc("AAAAT"));
    }

    proptest! {
        #[test]
        fn prop_test_edit_distance_symmetric(
            a in "[ACGT]{1,10}(-[ACGT]{1,10})?",
            b in "[ACGT]{1,10}(-[ACGT]{1,10})?",
        ) {
            let (a, b) = (bc(&a), bc(&b));
            assert_eq!(edit_distance(&a, &b), edit_distance(&b, &a));
            assert_eq!(edit_distance(&a, &a), 0);
            assert_eq!(similarity(&a, &a), 0);
        }
    }
}
