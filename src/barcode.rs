// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Sample index barcodes, as recorded on a sample's index tag.
//!
//! A barcode has one or two index segments. The empty barcode ("NoIndex") is
//! used for lanes that are not demultiplexed.

use crate::error::{DeciderError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref SINGLE_BARCODE_REGEX: Regex = Regex::new(r"^([ATCG]+)$").unwrap();
    static ref DUAL_BARCODE_REGEX: Regex = Regex::new(r"^([ATCG]+)-([ATCG]+)$").unwrap();
}

/// Uppercase `segment` and check it is a nucleotide run.
fn segment(segment: &str) -> Result<String> {
    let upper = segment.to_ascii_uppercase();
    if SINGLE_BARCODE_REGEX.is_match(&upper) {
        Ok(upper)
    } else {
        Err(DeciderError::data_mismatch(format!(
            "Invalid barcode segment = [{segment}]"
        )))
    }
}

pub const NO_INDEX: &str = "NoIndex";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Barcode {
    one: String,
    two: Option<String>,
}

impl Barcode {
    /// The empty barcode
    pub fn no_index() -> Barcode {
        Barcode::default()
    }

    /// A single index barcode. Fails unless `one` is a non-empty ACGT run.
    pub fn single(one: impl AsRef<str>) -> Result<Barcode> {
        Ok(Barcode {
            one: segment(one.as_ref())?,
            two: None,
        })
    }

    /// A dual index barcode. Fails unless both segments are non-empty ACGT runs.
    pub fn dual(one: impl AsRef<str>, two: impl AsRef<str>) -> Result<Barcode> {
        Ok(Barcode {
            one: segment(one.as_ref())?,
            two: Some(segment(two.as_ref())?),
        })
    }

    /// Segment one. Empty for the NoIndex barcode.
    pub fn one(&self) -> &str {
        &self.one
    }

    pub fn two(&self) -> Option<&str> {
        self.two.as_deref()
    }

    pub fn is_no_index(&self) -> bool {
        self.one.is_empty() && self.two.as_deref().map_or(true, str::is_empty)
    }

    pub fn is_dual(&self) -> bool {
        self.two.is_some()
    }

    /// `NoIndex`, `8` or `8x8`
    pub fn length_descriptor(&self) -> String {
        match self.two {
            _ if self.one.is_empty() => NO_INDEX.to_string(),
            None => self.one.len().to_string(),
            Some(ref two) => format!("{}x{}", self.one.len(), two.len()),
        }
    }

    /// Name used in lane linking strings, where the empty barcode is spelled out.
    pub fn linking_name(&self) -> String {
        if self.is_no_index() {
            NO_INDEX.to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.two {
            Some(ref two) => write!(f, "{}-{}", self.one, two),
            None => write!(f, "{}", self.one),
        }
    }
}

impl FromStr for Barcode {
    type Err = DeciderError;

    /// Accepts `""`, `NoIndex`, `ACGT` and `ACGT-TTGA`, in any case.
    fn from_str(s: &str) -> Result<Barcode> {
        if s.is_empty() || s.eq_ignore_ascii_case(NO_INDEX) {
            return Ok(Barcode::no_index());
        }

        let upper = s.to_ascii_uppercase();
        if let Some(caps) = SINGLE_BARCODE_REGEX.captures(&upper) {
            return Ok(Barcode {
                one: caps[1].to_string(),
                two: None,
            });
        }
        if let Some(caps) = DUAL_BARCODE_REGEX.captures(&upper) {
            return Ok(Barcode {
                one: caps[1].to_string(),
                two: Some(caps[2].to_string()),
            });
        }

        Err(DeciderError::data_mismatch(format!(
            "Not able to parse barcode string = [{s}]"
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;

    #[test]
    fn single_barcode() -> Result<()> {
        let bc: Barcode = "AAAA".parse()?;
        assert_eq!(bc.one(), "AAAA");
        assert_eq!(bc.two(), None);

        assert_eq!("aaaA".parse::<Barcode>()?, "AAAA".parse::<Barcode>()?);
        assert_eq!("atcg".parse::<Barcode>()?.one(), "ATCG");
        Ok(())
    }

    #[test]
    fn dual_barcode() -> Result<()> {
        let bc: Barcode = "aaaA-ttttT".parse()?;
        assert_eq!(bc.one(), "AAAA");
        assert_eq!(bc.two(), Some("TTTTT"));
        assert_eq!(bc.to_string(), "AAAA-TTTTT");
        Ok(())
    }

    #[test]
    fn no_index() -> Result<()> {
        for s in ["", "NoIndex", "noindex"] {
            let bc: Barcode = s.parse()?;
            assert!(bc.is_no_index());
            assert_eq!(bc.to_string(), "");
            assert_eq!(bc.linking_name(), "NoIndex");
            assert_eq!(bc.length_descriptor(), "NoIndex");
        }
        Ok(())
    }

    #[test]
    fn bad_barcodes() {
        for s in [
            "AAAAB",
            "AAAA-",
            " AAAA ",
            "AAAA-TTTTB",
            "AAAA-TTTT-",
            " AAAA-TTTT ",
            "SI-GA-A1",
        ] {
            let err = s.parse::<Barcode>().unwrap_err();
            assert_eq!(
                err,
                DeciderError::DataMismatch(format!("Not able to parse barcode string = [{s}]"))
            );
        }
    }

    #[test]
    fn length_descriptor() -> Result<()> {
        assert_eq!("ACGTACGT".parse::<Barcode>()?.length_descriptor(), "8");
        assert_eq!("ACGTACGT-AAAAAA".parse::<Barcode>()?.length_descriptor(), "8x6");
        Ok(())
    }

    #[test]
    fn constructors_check_segments() -> Result<()> {
        assert_eq!(Barcode::single("acgt")?, "ACGT".parse::<Barcode>()?);
        assert_eq!(Barcode::dual("AAAA", "ttgg")?.to_string(), "AAAA-TTGG");

        for (one, two) in [("", Some("AAAA")), ("AAAA", Some("")), ("NNXX", None), ("AA-TT", None)] {
            let bc = match two {
                Some(two) => Barcode::dual(one, two),
                None => Barcode::single(one),
            };
            assert!(matches!(bc, Err(DeciderError::DataMismatch(_))), "{one} {two:?}");
        }
        assert_eq!(
            Barcode::single("NNXX"),
            Err(DeciderError::DataMismatch("Invalid barcode segment = [NNXX]".to_string()))
        );
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_test_parse_display(
            one in "[ACGTacgt]{1,12}",
            two in proptest::option::of("[ACGTacgt]{1,12}"),
        ) {
            let text = match two {
                Some(ref two) => format!("{one}-{two}"),
                None => one.clone(),
            };
            let bc: Barcode = text.parse().unwrap();
            assert_eq!(bc.to_string(), text.to_ascii_uppercase());
            assert_eq!(bc.to_string().parse::<Barcode>().unwrap(), bc);
        }
    }
}
