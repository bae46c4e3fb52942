// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Error taxonomy shared by the barcode, bases-mask and lane planning code.
//!
//! These errors abort the unit of work that raised them: a single lane, or
//! the whole invocation when raised before lanes are processed. Problems that
//! only demote one plan to invalid are accumulated as strings on the plan
//! instead, see [`crate::plan::PlanBuilder::add_error`].

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeciderError {
    /// A value does not match its expected grammar, or a derived value is
    /// inconsistent with its inputs.
    #[error("{0}")]
    DataMismatch(String),

    #[error("{0}")]
    InvalidBasesMask(String),

    #[error("{0}")]
    InvalidLane(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Workflow [{name}-{version}] is not supported")]
    UnsupportedWorkflow { name: String, version: String },

    #[error("provenance lookup failed: {0}")]
    Provenance(String),
}

impl DeciderError {
    pub(crate) fn data_mismatch(msg: impl Into<String>) -> Self {
        DeciderError::DataMismatch(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DeciderError>;
