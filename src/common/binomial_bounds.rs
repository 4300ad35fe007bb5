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

//! Confidence bounds for a theta-sketch-style estimate, modeled as a
//! binomial thinning process: `num_retained` successes were observed out
//! of an unknown `N` trials, each independently retained with probability
//! `theta`. The point estimate is `num_retained / theta`; these functions
//! give a `k`-standard-deviation confidence interval around it.

use crate::common::NumStdDev;
use crate::error::Error;

fn validate_theta(theta: f64) -> Result<(), Error> {
    if !(theta > 0.0 && theta <= 1.0) {
        return Err(Error::argument(format!("theta must be in (0, 1], got {theta}")));
    }
    Ok(())
}

/// Lower confidence bound on the true distinct count.
pub fn lower_bound(num_retained: u64, theta: f64, kappa: NumStdDev) -> Result<f64, Error> {
    validate_theta(theta)?;
    if theta >= 1.0 {
        return Ok(num_retained as f64);
    }
    let n = num_retained as f64;
    let estimate = n / theta;
    let std_err = (n * (1.0 - theta)).sqrt() / theta;
    Ok((estimate - kappa.as_f64() * std_err).max(n))
}

/// Upper confidence bound on the true distinct count.
pub fn upper_bound(num_retained: u64, theta: f64, kappa: NumStdDev, is_empty: bool) -> Result<f64, Error> {
    if is_empty {
        return Ok(0.0);
    }
    validate_theta(theta)?;
    if theta >= 1.0 {
        return Ok(num_retained as f64);
    }
    let n = num_retained as f64;
    let estimate = n / theta;
    let std_err = (n * (1.0 - theta)).sqrt() / theta;
    Ok(estimate + kappa.as_f64() * std_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_mode_collapses_bounds_to_estimate() {
        for kappa in [NumStdDev::One, NumStdDev::Two, NumStdDev::Three] {
            assert_eq!(lower_bound(100, 1.0, kappa).unwrap(), 100.0);
            assert_eq!(upper_bound(100, 1.0, kappa, false).unwrap(), 100.0);
        }
    }

    #[test]
    fn empty_upper_bound_is_zero() {
        assert_eq!(upper_bound(0, 0.5, NumStdDev::Two, true).unwrap(), 0.0);
    }

    #[test]
    fn bounds_bracket_the_estimate() {
        let theta = 0.25;
        let n = 2_000u64;
        let estimate = n as f64 / theta;
        for kappa in [NumStdDev::One, NumStdDev::Two, NumStdDev::Three] {
            let lb = lower_bound(n, theta, kappa).unwrap();
            let ub = upper_bound(n, theta, kappa, false).unwrap();
            assert!(lb <= estimate);
            assert!(ub >= estimate);
            assert!(lb <= ub);
        }
    }

    #[test]
    fn wider_kappa_widens_the_interval() {
        let theta = 0.1;
        let n = 500u64;
        let lb1 = lower_bound(n, theta, NumStdDev::One).unwrap();
        let lb3 = lower_bound(n, theta, NumStdDev::Three).unwrap();
        let ub1 = upper_bound(n, theta, NumStdDev::One, false).unwrap();
        let ub3 = upper_bound(n, theta, NumStdDev::Three, false).unwrap();
        assert!(lb3 <= lb1);
        assert!(ub3 >= ub1);
    }

    #[test]
    fn rejects_out_of_range_theta() {
        assert!(lower_bound(1, 0.0, NumStdDev::One).is_err());
        assert!(lower_bound(1, 1.5, NumStdDev::One).is_err());
    }
}
