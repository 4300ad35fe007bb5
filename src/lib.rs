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

//! Theta sketches: a mergeable, set-operable approximate distinct-count
//! data structure.
//!
//! A [`theta::ThetaSketch`] consumes items and maintains a bounded,
//! probabilistic summary of the distinct items it has seen. The summary can
//! be queried for a cardinality [estimate](theta::ThetaSketchView::estimate),
//! serialized to a compact wire format, and combined with other sketches via
//! [`theta::ThetaUnion`], [`theta::ThetaIntersection`] and
//! [`theta::ThetaANotB`] to estimate the cardinality of a union,
//! intersection, or difference without ever materializing the underlying
//! sets.
//!
//! See `SPEC_FULL.md` in the repository root for the full functional
//! specification this crate implements, and `DESIGN.md` for the rationale
//! behind each module.

pub mod common;
pub mod error;
pub mod hash;
pub mod theta;

pub use error::Error;
pub use error::ErrorKind;
