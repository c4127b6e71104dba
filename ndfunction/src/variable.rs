/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Variables: the named, typed axes and columns of a function.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::value::Value;
use crate::value::ValueKind;

/// A handle to a variable in a function's store. Handles are only
/// meaningful for the function (and its projections) that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub(crate) usize);

impl VariableId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// How to evaluate a query that falls between two stored samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationType {
    /// The nearest stored sample; ties go to the lower one.
    None,
    /// The sample at or below the query (left hold).
    Constant,
    /// Straight line between the bracketing samples.
    #[default]
    Linear,
}

/// How to evaluate a query outside the stored argument range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtrapolationType {
    /// Fail with [`crate::Error::OutOfRange`].
    #[default]
    None,
    /// Hold the nearest boundary sample.
    Constant,
    /// Extend the line through the two boundary samples.
    Linear,
    /// Wrap the query into the stored range, modulo its span.
    Periodic,
}

/// The error returned when parsing a policy name fails.
#[derive(Debug, thiserror::Error)]
#[error("unknown policy `{0}`")]
pub struct ParsePolicyError(String);

impl FromStr for InterpolationType {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(InterpolationType::None),
            "constant" => Ok(InterpolationType::Constant),
            "linear" => Ok(InterpolationType::Linear),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl FromStr for ExtrapolationType {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ExtrapolationType::None),
            "constant" => Ok(ExtrapolationType::Constant),
            "linear" => Ok(ExtrapolationType::Linear),
            "periodic" => Ok(ExtrapolationType::Periodic),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// The metadata of one variable. Its values live in the function
/// store that owns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    kind: ValueKind,
    interpolation: InterpolationType,
    extrapolation: ExtrapolationType,
    is_editable: bool,
    default_value: Value,
}

impl Variable {
    /// A new editable variable with the default policies.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            interpolation: InterpolationType::default(),
            extrapolation: ExtrapolationType::default(),
            is_editable: true,
            default_value: kind.default_value(),
        }
    }

    pub fn with_interpolation(mut self, interpolation: InterpolationType) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_extrapolation(mut self, extrapolation: ExtrapolationType) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    pub fn with_editable(mut self, is_editable: bool) -> Self {
        self.is_editable = is_editable;
        self
    }

    /// Sets the value new cells of this variable start with. A value
    /// of a different kind is ignored and keeps the previous default.
    pub fn with_default_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.kind() == self.kind {
            self.default_value = value;
        } else {
            tracing::warn!(
                variable = %self.name,
                expected = %self.kind,
                got = %value.kind(),
                "ignoring default value of the wrong kind"
            );
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn interpolation(&self) -> InterpolationType {
        self.interpolation
    }

    pub fn extrapolation(&self) -> ExtrapolationType {
        self.extrapolation
    }

    pub fn is_editable(&self) -> bool {
        self.is_editable
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub(crate) fn set_interpolation(&mut self, interpolation: InterpolationType) {
        self.interpolation = interpolation;
    }

    pub(crate) fn set_extrapolation(&mut self, extrapolation: ExtrapolationType) {
        self.extrapolation = extrapolation;
    }
}
