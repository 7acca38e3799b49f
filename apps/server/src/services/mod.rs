// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Business logic services.

pub mod storage;
pub mod summary;

#[cfg(test)]
pub mod test_support;

pub use storage::{ModelStore, StoredFile};
pub use summary::load_summary;
