// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The lane-linking string handed to the demultiplexing workflow:
//!
//! ```text
//! 1,100:NoIndex,101,Sample_A|2,103:AAAA,104,Sample_B+TTTT,105,Sample_C
//! ```
//!
//! Each lane is `laneNumber,laneKey:` followed by its samples joined with `+`,
//! each sample is `barcode,sampleKey,sampleName[,groupId]`, and lanes are
//! joined with `|`.

use crate::barcode::Barcode;
use crate::error::{DeciderError, Result};
use crate::plan::LinkingKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LinkedSample {
    pub name: String,
    pub barcode: Barcode,
    pub key: LinkingKey,
    pub group_id: Option<String>,
}

impl fmt::Display for LinkedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.barcode.linking_name(), self.key, self.name)?;
        match self.group_id.as_deref() {
            Some(group_id) if !group_id.is_empty() => write!(f, ",{group_id}"),
            _ => Ok(()),
        }
    }
}

impl FromStr for LinkedSample {
    type Err = DeciderError;

    fn from_str(s: &str) -> Result<LinkedSample> {
        let fields: Vec<&str> = s.split(',').collect();
        if !(3..=4).contains(&fields.len()) {
            return Err(DeciderError::data_mismatch(format!(
                "Expected barcode,key,name[,group] in sample entry [{s}]"
            )));
        }
        Ok(LinkedSample {
            barcode: fields[0].parse()?,
            key: parse_key(fields[1])?,
            name: fields[2].to_string(),
            group_id: fields.get(3).map(|g| g.to_string()),
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LinkedLane {
    pub lane_number: String,
    pub key: LinkingKey,
    pub samples: Vec<LinkedSample>,
}

impl LinkedLane {
    /// Render the lane. Samples are ordered by name. A lane holding a single
    /// sample is written as `NoIndex` unless `demux_single_sample` is set.
    pub fn render(&self, demux_single_sample: bool) -> String {
        let mut samples: Vec<&LinkedSample> = self.samples.iter().collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));

        let entries = if samples.len() == 1 && !demux_single_sample {
            let sample = LinkedSample {
                barcode: Barcode::no_index(),
                ..samples[0].clone()
            };
            sample.to_string()
        } else {
            samples.iter().join("+")
        };
        format!("{},{}:{}", self.lane_number, self.key, entries)
    }
}

fn parse_key(s: &str) -> Result<LinkingKey> {
    s.parse()
        .map_err(|_| DeciderError::data_mismatch(format!("Invalid linking key [{s}]")))
}

/// Render lanes in the order given.
pub fn linking_string(lanes: &[LinkedLane], demux_single_sample: bool) -> String {
    lanes
        .iter()
        .map(|lane| lane.render(demux_single_sample))
        .join("|")
}

pub fn parse_linking_string(s: &str) -> Result<Vec<LinkedLane>> {
    s.split('|')
        .map(|lane| {
            let (head, samples) = lane
                .split_once(':')
                .ok_or_else(|| DeciderError::data_mismatch(format!("Missing ':' in lane entry [{lane}]")))?;
            let (lane_number, key) = head
                .split_once(',')
                .ok_or_else(|| DeciderError::data_mismatch(format!("Missing ',' in lane entry [{lane}]")))?;
            Ok(LinkedLane {
                lane_number: lane_number.to_string(),
                key: parse_key(key)?,
                samples: samples
                    .split('+')
                    .map(LinkedSample::from_str)
                    .collect::<Result<_>>()?,
            })
        })
        .collect()
}
