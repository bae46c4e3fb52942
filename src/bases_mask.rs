// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The `--use-bases-mask` cycle plan given to bcl2fastq.
//!
//! A bases mask assigns each of the instrument's read segments (read one,
//! index one, optional index two, optional read two) an include length and
//! an ignore length, e.g. `y151,i8n*,i8n*,y151`. `*` means "the remainder of
//! the read".

use crate::error::{DeciderError, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of one include or ignore stretch of a read segment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentLength {
    Cycles(u32),
    Remainder,
}

impl SegmentLength {
    /// Parses `*` or a cycle count. `0` is the same as leaving the length out.
    fn parse(s: &str) -> Result<Option<SegmentLength>> {
        if s == "*" {
            return Ok(Some(SegmentLength::Remainder));
        }
        match s.parse::<u32>() {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(SegmentLength::Cycles(n))),
            Err(_) => Err(DeciderError::InvalidBasesMask(format!(
                "Unsupported bases mask length [{s}]"
            ))),
        }
    }

    /// Number of cycles kept from a sequence of `len` bases.
    pub fn take(self, len: usize) -> usize {
        match self {
            SegmentLength::Cycles(n) => len.min(n as usize),
            SegmentLength::Remainder => len,
        }
    }
}

impl fmt::Display for SegmentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentLength::Cycles(n) => write!(f, "{n}"),
            SegmentLength::Remainder => write!(f, "*"),
        }
    }
}

/// Which field of a `BasesMask` a capture group fills, in declaration order.
#[derive(Clone, Copy)]
enum Field {
    ReadOneInclude,
    ReadOneIgnore,
    IndexOneInclude,
    IndexOneIgnore,
    IndexTwoInclude,
    IndexTwoIgnore,
    ReadTwoInclude,
    ReadTwoIgnore,
}

use Field::*;

const L: &str = r"(\*|\d+)";

lazy_static! {
    /// Accepted layouts, tried in order. Input is lowercased before matching.
    static ref GRAMMAR: Vec<(Regex, Vec<Field>)> = {
        let layouts: Vec<(String, Vec<Field>)> = vec![
            // dual index
            (
                format!("y{L}n{L},i{L}n{L},i{L}n{L},y{L}n{L}"),
                vec![ReadOneInclude, ReadOneIgnore, IndexOneInclude, IndexOneIgnore,
                     IndexTwoInclude, IndexTwoIgnore, ReadTwoInclude, ReadTwoIgnore],
            ),
            (
                format!("y{L},i{L}n{L},i{L}n{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexOneIgnore,
                     IndexTwoInclude, IndexTwoIgnore, ReadTwoInclude],
            ),
            (
                format!("y{L},i{L},i{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexTwoInclude, ReadTwoInclude],
            ),
            (
                format!("y{L},i{L},n{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexTwoIgnore, ReadTwoInclude],
            ),
            (
                format!("y{L},n{L},i{L},y{L}"),
                vec![ReadOneInclude, IndexOneIgnore, IndexTwoInclude, ReadTwoInclude],
            ),
            (
                format!("y{L},i{L}n{L},n{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexOneIgnore, IndexTwoIgnore, ReadTwoInclude],
            ),
            (
                format!("y{L},n{L},i{L}n{L},y{L}"),
                vec![ReadOneInclude, IndexOneIgnore, IndexTwoInclude, IndexTwoIgnore, ReadTwoInclude],
            ),
            (
                format!("y{L},n{L},n{L},y{L}"),
                vec![ReadOneInclude, IndexOneIgnore, IndexTwoIgnore, ReadTwoInclude],
            ),
            // single index
            (
                format!("y{L}n{L},i{L}n{L},y{L}n{L}"),
                vec![ReadOneInclude, ReadOneIgnore, IndexOneInclude, IndexOneIgnore,
                     ReadTwoInclude, ReadTwoIgnore],
            ),
            (
                format!("y{L},i{L}n{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexOneIgnore, ReadTwoInclude],
            ),
            (
                format!("y{L},i{L},y{L}"),
                vec![ReadOneInclude, IndexOneInclude, ReadTwoInclude],
            ),
            (
                format!("y{L},n{L},y{L}"),
                vec![ReadOneInclude, IndexOneIgnore, ReadTwoInclude],
            ),
            // single end
            (
                format!("y{L},i{L}n{L},i{L}n{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexOneIgnore, IndexTwoInclude, IndexTwoIgnore],
            ),
            (
                format!("y{L},i{L},i{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexTwoInclude],
            ),
            (
                format!("y{L}n{L},i{L}n{L}"),
                vec![ReadOneInclude, ReadOneIgnore, IndexOneInclude, IndexOneIgnore],
            ),
            (
                format!("y{L},i{L}n{L}"),
                vec![ReadOneInclude, IndexOneInclude, IndexOneIgnore],
            ),
            (
                format!("y{L},i{L}"),
                vec![ReadOneInclude, IndexOneInclude],
            ),
        ];
        layouts
            .into_iter()
            .map(|(re, fields)| (Regex::new(&format!("^{re}$")).unwrap(), fields))
            .collect()
    };
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BasesMask {
    read_one_include: Option<SegmentLength>,
    read_one_ignore: Option<SegmentLength>,
    index_one_include: Option<SegmentLength>,
    index_one_ignore: Option<SegmentLength>,
    index_two_include: Option<SegmentLength>,
    index_two_ignore: Option<SegmentLength>,
    read_two_include: Option<SegmentLength>,
    read_two_ignore: Option<SegmentLength>,
}

impl BasesMask {
    /// A mask with every length absent. Use [`BasesMaskBuilder`] for the usual defaults.
    pub fn empty() -> BasesMask {
        BasesMask {
            read_one_include: None,
            read_one_ignore: None,
            index_one_include: None,
            index_one_ignore: None,
            index_two_include: None,
            index_two_ignore: None,
            read_two_include: None,
            read_two_ignore: None,
        }
    }

    pub fn read_one_include(&self) -> Option<SegmentLength> {
        self.read_one_include
    }
    pub fn read_one_ignore(&self) -> Option<SegmentLength> {
        self.read_one_ignore
    }
    pub fn index_one_include(&self) -> Option<SegmentLength> {
        self.index_one_include
    }
    pub fn index_one_ignore(&self) -> Option<SegmentLength> {
        self.index_one_ignore
    }
    pub fn index_two_include(&self) -> Option<SegmentLength> {
        self.index_two_include
    }
    pub fn index_two_ignore(&self) -> Option<SegmentLength> {
        self.index_two_ignore
    }
    pub fn read_two_include(&self) -> Option<SegmentLength> {
        self.read_two_include
    }
    pub fn read_two_ignore(&self) -> Option<SegmentLength> {
        self.read_two_ignore
    }

    /// 2 for paired-end runs, 1 when the mask has no read two.
    pub fn read_ends(&self) -> u8 {
        if self.read_two_include.is_some() || self.read_two_ignore.is_some() {
            2
        } else {
            1
        }
    }

    fn set(&mut self, field: Field, value: Option<SegmentLength>) {
        let slot = match field {
            ReadOneInclude => &mut self.read_one_include,
            ReadOneIgnore => &mut self.read_one_ignore,
            IndexOneInclude => &mut self.index_one_include,
            IndexOneIgnore => &mut self.index_one_ignore,
            IndexTwoInclude => &mut self.index_two_include,
            IndexTwoIgnore => &mut self.index_two_ignore,
            ReadTwoInclude => &mut self.read_two_include,
            ReadTwoIgnore => &mut self.read_two_ignore,
        };
        *slot = value;
    }

    fn from_captures(caps: &Captures<'_>, fields: &[Field]) -> Result<BasesMask> {
        let mut mask = BasesMask::empty();
        for (i, field) in fields.iter().enumerate() {
            mask.set(*field, SegmentLength::parse(&caps[i + 1])?);
        }
        Ok(mask)
    }
}

fn segment(include: &str, include_len: Option<SegmentLength>, ignore_len: Option<SegmentLength>) -> String {
    let mut s = String::new();
    for (prefix, len) in [(include, include_len), ("n", ignore_len)] {
        match len {
            None | Some(SegmentLength::Cycles(0)) => {}
            Some(len) => {
                s.push_str(prefix);
                s.push_str(&len.to_string());
            }
        }
    }
    s
}

impl fmt::Display for BasesMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = vec![
            segment("y", self.read_one_include, self.read_one_ignore),
            segment("i", self.index_one_include, self.index_one_ignore),
        ];
        if self.index_two_include.is_some() || self.index_two_ignore.is_some() {
            segments.push(segment("i", self.index_two_include, self.index_two_ignore));
        }
        if self.read_ends() == 2 {
            segments.push(segment("y", self.read_two_include, self.read_two_ignore));
        }
        write!(f, "{}", segments.join(","))
    }
}

impl FromStr for BasesMask {
    type Err = DeciderError;

    fn from_str(s: &str) -> Result<BasesMask> {
        let lower = s.to_ascii_lowercase();
        for (re, fields) in GRAMMAR.iter() {
            if let Some(caps) = re.captures(&lower) {
                return BasesMask::from_captures(&caps, fields);
            }
        }
        Err(DeciderError::InvalidBasesMask(format!(
            "Unsupported bases mask string [{s}]"
        )))
    }
}

/// Builds a `BasesMask`, starting from `y*,i*n*,y*`.
#[derive(Clone, Copy, Debug)]
pub struct BasesMaskBuilder {
    mask: BasesMask,
}

impl Default for BasesMaskBuilder {
    fn default() -> Self {
        BasesMaskBuilder {
            mask: BasesMask {
                read_one_include: Some(SegmentLength::Remainder),
                index_one_include: Some(SegmentLength::Remainder),
                index_one_ignore: Some(SegmentLength::Remainder),
                read_two_include: Some(SegmentLength::Remainder),
                ..BasesMask::empty()
            },
        }
    }
}

impl BasesMaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_one(mut self, include: Option<SegmentLength>, ignore: Option<SegmentLength>) -> Self {
        self.mask.read_one_include = include;
        self.mask.read_one_ignore = ignore;
        self
    }

    pub fn index_one_include(mut self, len: Option<SegmentLength>) -> Self {
        self.mask.index_one_include = len;
        self
    }

    pub fn index_one_ignore(mut self, len: Option<SegmentLength>) -> Self {
        self.mask.index_one_ignore = len;
        self
    }

    pub fn index_two_include(mut self, len: Option<SegmentLength>) -> Self {
        self.mask.index_two_include = len;
        self
    }

    pub fn index_two_ignore(mut self, len: Option<SegmentLength>) -> Self {
        self.mask.index_two_ignore = len;
        self
    }

    pub fn read_two(mut self, include: Option<SegmentLength>, ignore: Option<SegmentLength>) -> Self {
        self.mask.read_two_include = include;
        self.mask.read_two_ignore = ignore;
        self
    }

    pub fn build(self) -> BasesMask {
        self.mask
    }
}
