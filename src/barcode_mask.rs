// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Reconcile sample barcodes with the cycles a run actually sequenced.

use crate::barcode::Barcode;
use crate::bases_mask::{BasesMask, BasesMaskBuilder, SegmentLength};
use crate::error::{DeciderError, Result};
use itertools::Itertools;

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn truncate_segment<'a>(
    segment: Option<&'a str>,
    include: Option<SegmentLength>,
    strict: bool,
    which: &str,
) -> Result<Option<&'a str>> {
    match (include, segment) {
        (None, _) => Ok(None),
        (Some(_), None) if strict => Err(DeciderError::data_mismatch(format!(
            "Barcode {which} missing but bases mask requires it"
        ))),
        (Some(_), None) => Ok(None),
        (Some(len), Some(seq)) => Ok(Some(&seq[..len.take(seq.len())])),
    }
}

/// Truncate `barcode` to the index cycles `mask` sequences.
///
/// Segments the mask does not include are dropped. Segments longer than the
/// include length are truncated, shorter ones are kept as they are. When
/// `strict` is set, a mask that includes a segment the barcode does not have
/// is an error. If only index two survives it becomes a single barcode.
pub fn apply_mask(barcode: &Barcode, mask: &BasesMask, strict: bool) -> Result<Barcode> {
    if barcode.is_no_index() {
        return Ok(barcode.clone());
    }

    let one = truncate_segment(
        non_empty(Some(barcode.one())),
        mask.index_one_include(),
        strict,
        "one",
    )?;
    let two = truncate_segment(
        non_empty(barcode.two()),
        mask.index_two_include(),
        strict,
        "two",
    )?;

    match (one, two) {
        (Some(one), None) => Barcode::single(one),
        (None, Some(two)) => Barcode::single(two),
        (Some(one), Some(two)) => Barcode::dual(one, two),
        (None, None) => Err(DeciderError::data_mismatch(format!(
            "Unexpected state, barcode one = [{}], barcode two = [{}]",
            barcode.one(),
            barcode.two().unwrap_or_default()
        ))),
    }
}

/// The smallest mask that reads exactly this barcode; reads take the remainder.
pub fn derive_minimal_mask(barcode: &Barcode) -> BasesMask {
    let index_len = |s: Option<&str>| non_empty(s).map(|s| SegmentLength::Cycles(s.len() as u32));

    let mut builder = BasesMaskBuilder::new()
        .index_one_include(index_len(Some(barcode.one())))
        .index_one_ignore(Some(SegmentLength::Remainder));

    if let Some(len) = index_len(barcode.two()) {
        builder = builder
            .index_two_include(Some(len))
            .index_two_ignore(Some(SegmentLength::Remainder));
    }
    builder.build()
}

/// Derive the mask for `barcode` on a run sequenced with `run_mask`.
///
/// Read lengths come from `run_mask`. Index lengths come from the barcode
/// after truncation against `run_mask`. An index two the run sequenced but
/// the barcode does not use is ignored entirely.
pub fn derive_mask(barcode: &Barcode, run_mask: &BasesMask, strict: bool) -> Result<BasesMask> {
    let sequenced = apply_mask(barcode, run_mask, strict)?;
    let minimal = derive_minimal_mask(&sequenced);

    let index_one_ignore = run_mask
        .index_one_ignore()
        .or(Some(SegmentLength::Remainder));

    let (index_two_include, mut index_two_ignore) = match run_mask.index_two_include() {
        None => (None, None),
        Some(_) => match minimal.index_two_include() {
            Some(len) => (Some(len), minimal.index_two_ignore()),
            None if run_mask.index_one_include().is_some() => (None, Some(SegmentLength::Remainder)),
            None => (None, None),
        },
    };
    if run_mask.index_two_ignore().is_some() {
        index_two_ignore = run_mask.index_two_ignore();
    }

    Ok(BasesMaskBuilder::new()
        .read_one(run_mask.read_one_include(), run_mask.read_one_ignore())
        .index_one_include(minimal.index_one_include())
        .index_one_ignore(index_one_ignore)
        .index_two_include(index_two_include)
        .index_two_ignore(index_two_ignore)
        .read_two(run_mask.read_two_include(), run_mask.read_two_ignore())
        .build())
}

fn only_mask(masks: Vec<BasesMask>) -> Result<BasesMask> {
    let distinct: Vec<BasesMask> = masks.into_iter().unique().collect();
    match distinct.as_slice() {
        [mask] => Ok(*mask),
        _ => Err(DeciderError::data_mismatch(format!(
            "Expected one bases mask for a barcode set, found: [{}]",
            distinct.iter().map(ToString::to_string).sorted().join(", ")
        ))),
    }
}

/// The one minimal mask shared by every barcode of a lane.
pub fn derive_minimal_mask_for_set(barcodes: &[Barcode]) -> Result<BasesMask> {
    only_mask(barcodes.iter().map(derive_minimal_mask).collect())
}

/// The one mask shared by every barcode of a lane, on a run sequenced with
/// `run_mask`. Every per-barcode failure is reported.
pub fn derive_mask_for_set(
    barcodes: &[Barcode],
    run_mask: &BasesMask,
    strict: bool,
) -> Result<BasesMask> {
    let mut masks = Vec::new();
    let mut errors = Vec::new();
    for barcode in barcodes {
        match derive_mask(barcode, run_mask, strict) {
            Ok(mask) => masks.push(mask),
            Err(e) => errors.push(format!("{barcode}: {e}")),
        }
    }

    if !errors.is_empty() {
        return Err(DeciderError::data_mismatch(format!(
            "There were errors calculating bases mask for:\n{}",
            errors.join("\n")
        )));
    }
    only_mask(masks)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bc(s: &str) -> Barcode {
        s.parse().unwrap()
    }

    fn bm(s: &str) -> BasesMask {
        s.parse().unwrap()
    }

    fn applied(barcode: &str, mask: &str, strict: bool) -> String {
        apply_mask(&bc(barcode), &bm(mask), strict).unwrap().to_string()
    }

    fn derived(barcode: &str, run_mask: &str) -> String {
        derive_mask(&bc(barcode), &bm(run_mask), false)
            .unwrap()
            .to_string()
    }

    #[test]
    fn apply_mask_strict() {
        assert_eq!(applied("AAAA", "y*,i*,y*", true), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,y*", true), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,n*,i*,y*", true), "TTTT");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,n*,y*", true), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,i*,y*", true), "AAAA-TTTT");
        assert_eq!(applied("AAAA-AAAA", "y*,i2,i2,y*", true), "AA-AA");
    }

    #[test]
    fn apply_mask_strict_failures() {
        for mask in ["y*,n*,i*,y*", "y*,i*,i*,y*", "y*,i2,i2,y*"] {
            let err = apply_mask(&bc("AAAA"), &bm(mask), true).unwrap_err();
            assert!(matches!(err, DeciderError::DataMismatch(_)), "{mask}");
        }
        assert_eq!(
            apply_mask(&bc("AAAA"), &bm("y*,i*,i*,y*"), true),
            Err(DeciderError::DataMismatch(
                "Barcode two missing but bases mask requires it".to_string()
            ))
        );
    }

    #[test]
    fn apply_mask_lenient() {
        assert_eq!(applied("AAAA", "y*,i*,y*", false), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,y*", false), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,n*,i*,y*", false), "TTTT");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,n*,y*", false), "AAAA");
        assert_eq!(applied("AAAA-TTTT", "y*,i*,i*,y*", false), "AAAA-TTTT");
        assert_eq!(applied("AAAA-TTTT", "y*,i2,n*,y*", false), "AA");
        assert_eq!(applied("AAAA-TTTT", "y*,n*,i2,y*", false), "TT");
        assert_eq!(applied("AAAA-TTTT", "y*,i2,i2,y*", false), "AA-TT");
        assert_eq!(applied("AAAA", "y*,i*,i*,y*", false), "AAAA");
        assert_eq!(applied("AAAA", "y*,i2,i*,y*", false), "AA");
        assert_eq!(applied("AAAA", "y*,i2,i2,y*", false), "AA");
        // never padded
        assert_eq!(applied("AAAA", "y*,i8,y*", false), "AAAA");
    }

    #[test]
    fn apply_mask_nothing_left() {
        assert_eq!(
            apply_mask(&bc("AAAA"), &bm("y*,n*,i*,y*"), false),
            Err(DeciderError::DataMismatch(
                "Unexpected state, barcode one = [AAAA], barcode two = []".to_string()
            ))
        );
    }

    #[test]
    fn apply_mask_no_index() {
        assert_eq!(
            apply_mask(&Barcode::no_index(), &bm("y*,i8,i8,y*"), true),
            Ok(Barcode::no_index())
        );
    }

    #[test]
    fn minimal_mask() {
        assert_eq!(derive_minimal_mask(&bc("AAAAAAAA")).to_string(), "y*,i8n*,y*");
        assert_eq!(
            derive_minimal_mask(&bc("AAAAAAAA-AAAAAAAA")).to_string(),
            "y*,i8n*,i8n*,y*"
        );
        assert_eq!(derive_minimal_mask(&bc("A-AAAAAAAA")).to_string(), "y*,i1n*,i8n*,y*");
        assert_eq!(derive_minimal_mask(&Barcode::no_index()).to_string(), "y*,n*,y*");
    }

    #[test]
    fn mask_with_run_mask() {
        assert_eq!(derived("AAAAAAAA", "y*,i*,y*"), "y*,i8n*,y*");
        assert_eq!(derived("AAAAAAAA", "y*,i*,i*,y*"), "y*,i8n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i*,y*"), "y*,i8n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i*,i*,y*"), "y*,i8n*,i8n*,y*");

        assert_eq!(derived("AAAAAAAA", "y*,i8,y*"), "y*,i8n*,y*");
        assert_eq!(derived("AAAAAAAA", "y*,i8,i8,y*"), "y*,i8n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i8,y*"), "y*,i8n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i8,i8,y*"), "y*,i8n*,i8n*,y*");

        assert_eq!(derived("AAAAAAAA", "y*,i6,y*"), "y*,i6n*,y*");
        assert_eq!(derived("AAAAAAAA", "y*,i6,i6,y*"), "y*,i6n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i6,y*"), "y*,i6n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i6,n*,y*"), "y*,i6n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,n*,i6,y*"), "y*,i6n*,y*");
        assert_eq!(derived("AAAAAAAA-AAAAAAAA", "y*,i6,i6,y*"), "y*,i6n*,i6n*,y*");

        assert_eq!(derived("AAAAAAAA-TTTTTTTT", "y*,i*,n*,y*"), "y*,i8n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-TTTTTTTT", "y*,i6,n*,y*"), "y*,i6n*,n*,y*");
        assert_eq!(derived("AAAAAAAA-TTTTTTTT", "y*,n*,i*,y*"), "y*,i8n*,y*");
        assert_eq!(derived("AAAAAAAA-TTTTTTTT", "y*,n*,i6,y*"), "y*,i6n*,y*");

        assert_eq!(derived("AAAAAAAA", "y151,i6,y151"), "y151,i6n*,y151");
        assert_eq!(derived("AAAAAAAA", "y100,i8"), "y100,i8n*");
    }

    #[test]
    fn mask_with_override() {
        let barcode = bc("AAAAAAAA");
        assert_eq!(
            derive_mask(&barcode, &bm("Y*,I4,Y*"), true).unwrap().to_string(),
            "y*,i4n*,y*"
        );
        assert_eq!(
            derive_mask(&barcode, &bm("Y*,I9,Y*"), true).unwrap().to_string(),
            "y*,i8n*,y*"
        );
        assert!(derive_mask(&barcode, &bm("y*,i8,i8,y*"), true).is_err());
    }

    #[test]
    fn mask_requires_missing_index() {
        assert!(matches!(
            derive_mask(&bc("AAAAAAAA"), &bm("y*,n*,i*,y*"), false),
            Err(DeciderError::DataMismatch(_))
        ));
    }

    #[test]
    fn dual_barcode_trimmed_by_run_mask() {
        let barcode = bc("TAAGGCGA-TATCCTCT");
        let run_mask = bm("y*,i8n*,n*,y*");
        assert_eq!(apply_mask(&barcode, &run_mask, false), Ok(bc("TAAGGCGA")));
        assert_eq!(derive_mask(&barcode, &run_mask, false), Ok(bm("y*,i8n*,n*,y*")));
    }

    #[test]
    fn mask_for_set() {
        let barcodes = vec![bc("AAAAAAAA"), bc("TTTTTTTT"), bc("CCCCCCCCCC")];
        assert_eq!(
            derive_mask_for_set(&barcodes, &bm("y*,i8,y*"), true)
                .unwrap()
                .to_string(),
            "y*,i8n*,y*"
        );

        let err = derive_mask_for_set(&barcodes, &bm("y*,i*,y*"), true).unwrap_err();
        assert_eq!(
            err,
            DeciderError::DataMismatch(
                "Expected one bases mask for a barcode set, found: [y*,i10n*,y*, y*,i8n*,y*]"
                    .to_string()
            )
        );

        let err = derive_mask_for_set(&barcodes, &bm("y*,i8,i8,y*"), true).unwrap_err();
        let DeciderError::DataMismatch(msg) = err else {
            panic!("unexpected error {err:?}");
        };
        assert!(msg.starts_with("There were errors calculating bases mask for:\n"));
        assert_eq!(msg.lines().count(), 4);
    }

    #[test]
    fn minimal_mask_for_set() {
        assert_eq!(
            derive_minimal_mask_for_set(&[bc("AAAA"), bc("TTTT")])
                .unwrap()
                .to_string(),
            "y*,i4n*,y*"
        );
        assert!(derive_minimal_mask_for_set(&[bc("AAAA"), bc("TTTT-CCCC")]).is_err());
    }
}
