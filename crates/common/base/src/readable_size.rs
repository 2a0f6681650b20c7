// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A byte quantity with constructors for the common binary units.
///
/// Config fields that accept a size (block size, page size, max file bytes)
/// take a `ReadableSize` rather than a bare `u64` so defaults read as
/// `ReadableSize::mb(128)` instead of an opaque integer literal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ReadableSize(pub u64);

impl ReadableSize {
    #[must_use]
    pub const fn b(n: u64) -> Self { Self(n) }

    #[must_use]
    pub const fn kb(n: u64) -> Self { Self(n * 1024) }

    #[must_use]
    pub const fn mb(n: u64) -> Self { Self(n * 1024 * 1024) }

    #[must_use]
    pub const fn gb(n: u64) -> Self { Self(n * 1024 * 1024 * 1024) }

    #[must_use]
    pub const fn as_bytes(self) -> u64 { self.0 }
}

impl fmt::Display for ReadableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        write!(f, "{value:.1}{}", UNITS[unit])
    }
}

impl From<u64> for ReadableSize {
    fn from(value: u64) -> Self { Self(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_constructors_agree_with_as_bytes() {
        assert_eq!(ReadableSize::kb(1).as_bytes(), 1024);
        assert_eq!(ReadableSize::mb(1).as_bytes(), 1024 * 1024);
        assert_eq!(ReadableSize::gb(1).as_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn display_picks_the_largest_clean_unit() {
        assert_eq!(ReadableSize::mb(5).to_string(), "5.0MiB");
        assert_eq!(ReadableSize::b(512).to_string(), "512.0B");
    }
}
