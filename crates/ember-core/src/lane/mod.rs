// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The lane abstraction: one pass of the frame pipeline.
//!
//! A lane is a self-contained processing step with its own GPU programs. The
//! domain-specific contract (what a lane receives at initialization and per
//! frame) lives with the lanes themselves; this module holds what every lane
//! shares: identification and the error type.

use std::fmt;

/// Errors produced while initializing or running a lane.
#[derive(Debug)]
pub enum LaneError {
    /// The lane was run before a successful initialization.
    NotInitialized,
    /// A resource the lane depends on was not provided.
    MissingResource(&'static str),
    /// A domain-specific error occurred during execution.
    ExecutionFailed(Box<dyn std::error::Error + Send + Sync>),
    /// A domain-specific error occurred during initialization.
    InitializationFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneError::NotInitialized => write!(f, "Lane not initialized"),
            LaneError::MissingResource(name) => write!(f, "Missing lane resource: {name}"),
            LaneError::ExecutionFailed(e) => write!(f, "Lane execution failed: {e}"),
            LaneError::InitializationFailed(e) => write!(f, "Lane initialization failed: {e}"),
        }
    }
}

impl std::error::Error for LaneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaneError::ExecutionFailed(e) | LaneError::InitializationFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl LaneError {
    /// Wraps an execution failure.
    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LaneError::ExecutionFailed(Box::new(err))
    }

    /// Wraps an initialization failure.
    pub fn initialization(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LaneError::InitializationFailed(Box::new(err))
    }
}

/// Broad classification of what a lane does on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Compute dispatches only.
    Compute,
    /// Render passes drawing into the frame targets.
    Raster,
    /// Submission and presentation of the frame.
    Present,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Compute => write!(f, "Compute"),
            LaneKind::Raster => write!(f, "Raster"),
            LaneKind::Present => write!(f, "Present"),
        }
    }
}

/// Identification shared by every lane.
pub trait Lane: Send + Sync {
    /// Human-readable name of the lane, used in logs and timing output.
    fn strategy_name(&self) -> &'static str;

    /// The kind of work the lane performs.
    fn lane_kind(&self) -> LaneKind;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn wrapped_errors_keep_their_source() {
        let err = LaneError::execution(Boom);
        assert_eq!(format!("{err}"), "Lane execution failed: boom");
        assert!(err.source().is_some());

        let err = LaneError::initialization(Boom);
        assert_eq!(format!("{err}"), "Lane initialization failed: boom");
    }

    #[test]
    fn missing_resource_names_the_resource() {
        let err = LaneError::MissingResource("depth view");
        assert_eq!(format!("{err}"), "Missing lane resource: depth view");
        assert!(err.source().is_none());
    }
}
