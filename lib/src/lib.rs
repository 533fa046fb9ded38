// Copyright 2025 The git-duplicate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! git-duplicate: recreate a commit DAG on top of a different base commit
//! that has the same tree, remapping parent links instead of merging.

#![warn(missing_docs)]
#![deny(unused_must_use)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod duplicate;
pub mod git_backend;
pub mod hex_util;
pub mod object_id;
pub mod verify;
