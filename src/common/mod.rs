// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Shared, sketch-family-agnostic utilities.

pub mod binomial_bounds;

/// Table growth factor, expressed as its base-2 logarithm contribution
/// per resize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFactor {
    X1,
    X2,
    X4,
    X8,
}

impl ResizeFactor {
    pub fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }

    pub fn from_lg_value(lg: u8) -> Self {
        match lg {
            0 => ResizeFactor::X1,
            1 => ResizeFactor::X2,
            2 => ResizeFactor::X4,
            _ => ResizeFactor::X8,
        }
    }
}

impl Default for ResizeFactor {
    fn default() -> Self {
        ResizeFactor::X8
    }
}

/// Number of standard deviations used to compute a confidence bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStdDev {
    One,
    Two,
    Three,
}

impl NumStdDev {
    pub fn as_u8(self) -> u8 {
        match self {
            NumStdDev::One => 1,
            NumStdDev::Two => 2,
            NumStdDev::Three => 3,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.as_u8() as f64
    }
}
