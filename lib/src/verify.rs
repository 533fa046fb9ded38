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

//! Post-hoc consistency checks for duplicated commits.
//!
//! These checks guard against defects in the duplication engine itself, not
//! against bad user input. A violation is reported with full context so it
//! can be filed as a bug.

use std::fmt;

use thiserror::Error;

use crate::backend::CommitId;
use crate::backend::TreeId;
use crate::duplicate::DuplicateContext;
use crate::duplicate::DuplicateError;
use crate::duplicate::RemapEntry;

/// A duplicated commit that does not match its original. Carries the full
/// picture of both sides so the report can be maximally verbose.
#[derive(Debug, Error)]
#[error("Duplicated commit {new_id} is inconsistent with original commit {old_id}")]
#[allow(missing_docs)]
pub struct ConsistencyError {
    pub old_id: CommitId,
    pub new_id: CommitId,
    pub old_tree: TreeId,
    pub new_tree: TreeId,
    pub old_parents: Vec<CommitId>,
    pub new_parents: Vec<CommitId>,
    pub violations: Vec<ConsistencyViolation>,
}

/// One mismatch found while comparing a duplicated commit to its original.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyViolation {
    /// The new commit's tree differs from the original's.
    TreeMismatch { old_tree: TreeId, new_tree: TreeId },
    /// The parent lists have different lengths (never allowed to grow, and
    /// only isolate mode may shrink them).
    ParentCountMismatch { old_count: usize, new_count: usize },
    /// A duplicated parent is missing from the new parent list.
    MissingParent { old_parent: CommitId },
    /// A parent that should have been duplicated never was.
    UnresolvedParent { old_parent: CommitId },
    /// The old base must map to the new base, nothing else.
    BaseNotRemapped {
        old_base: CommitId,
        new_base: CommitId,
        actual: CommitId,
    },
    /// A duplicated parent resolved to the wrong commit.
    MisresolvedParent {
        old_parent: CommitId,
        expected: CommitId,
        actual: CommitId,
    },
    /// A remapped parent's tree differs from the original parent's tree.
    ParentTreeMismatch {
        old_parent: CommitId,
        new_parent: CommitId,
        old_parent_tree: TreeId,
        new_parent_tree: TreeId,
    },
    /// In default mode a parent outside the duplication set must be carried
    /// over unchanged.
    ForeignParentReplaced {
        old_parent: CommitId,
        actual: CommitId,
    },
    /// In isolate mode a parent outside the duplication set must not appear
    /// at all.
    ForeignParentRetained { old_parent: CommitId },
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TreeMismatch { old_tree, new_tree } => write!(
                f,
                "The new commit's tree should be {old_tree} as in the old commit, \
                 but is {new_tree}"
            ),
            Self::ParentCountMismatch {
                old_count,
                new_count,
            } => write!(
                f,
                "The old commit has {old_count} parents, the new commit has {new_count}"
            ),
            Self::MissingParent { old_parent } => write!(
                f,
                "Old parent {old_parent} was duplicated, but its counterpart is missing \
                 from the new commit's parents"
            ),
            Self::UnresolvedParent { old_parent } => write!(
                f,
                "Old parent {old_parent} belongs to the duplication set but was never \
                 duplicated"
            ),
            Self::BaseNotRemapped {
                old_base,
                new_base,
                actual,
            } => write!(
                f,
                "Old parent {old_base} is the old base and must map to the new base \
                 {new_base}, but the new commit has {actual} instead"
            ),
            Self::MisresolvedParent {
                old_parent,
                expected,
                actual,
            } => write!(
                f,
                "Old parent {old_parent} was duplicated as {expected}, but the new \
                 commit has {actual} instead"
            ),
            Self::ParentTreeMismatch {
                old_parent,
                new_parent,
                old_parent_tree,
                new_parent_tree,
            } => write!(
                f,
                "Old parent {old_parent} has tree {old_parent_tree}, but its \
                 counterpart {new_parent} has tree {new_parent_tree}"
            ),
            Self::ForeignParentReplaced { old_parent, actual } => write!(
                f,
                "Old parent {old_parent} is outside the duplication set and must be \
                 carried over unchanged, but the new commit has {actual} instead"
            ),
            Self::ForeignParentRetained { old_parent } => write!(
                f,
                "Old parent {old_parent} is outside the duplication set and must be \
                 dropped in isolate mode, but the new commit still lists it"
            ),
        }
    }
}

/// Checks that `new_id` is a faithful duplicate of `old_id`.
///
/// Walks the two parent lists with independent cursors: the old cursor
/// always advances; the new cursor advances only when a correspondence is
/// consumed. All mismatches are collected before failing so the report
/// shows the whole picture at once.
pub(crate) fn verify_duplicate(
    ctx: &DuplicateContext<'_>,
    old_id: &CommitId,
    new_id: &CommitId,
) -> Result<(), DuplicateError> {
    let old_tree = ctx.backend.tree_of(old_id)?;
    let new_tree = ctx.backend.tree_of(new_id)?;
    let old_parents = ctx.backend.parents_of(old_id)?;
    let new_parents = ctx.backend.parents_of(new_id)?;

    let mut violations = vec![];
    if old_tree != new_tree {
        violations.push(ConsistencyViolation::TreeMismatch {
            old_tree: old_tree.clone(),
            new_tree: new_tree.clone(),
        });
    }
    // Isolate mode may legitimately drop parents, but the list never grows.
    if (!ctx.options.isolate && old_parents.len() != new_parents.len())
        || old_parents.len() < new_parents.len()
    {
        violations.push(ConsistencyViolation::ParentCountMismatch {
            old_count: old_parents.len(),
            new_count: new_parents.len(),
        });
    } else {
        let mut new_iter = new_parents.iter();
        for old_parent in &old_parents {
            match ctx.table.get(old_parent) {
                RemapEntry::Resolved(mapped) => {
                    let Some(new_parent) = new_iter.next() else {
                        violations.push(ConsistencyViolation::MissingParent {
                            old_parent: old_parent.clone(),
                        });
                        continue;
                    };
                    if mapped != new_parent {
                        if old_parent == &ctx.old_base {
                            violations.push(ConsistencyViolation::BaseNotRemapped {
                                old_base: ctx.old_base.clone(),
                                new_base: ctx.new_base.clone(),
                                actual: new_parent.clone(),
                            });
                        } else {
                            violations.push(ConsistencyViolation::MisresolvedParent {
                                old_parent: old_parent.clone(),
                                expected: mapped.clone(),
                                actual: new_parent.clone(),
                            });
                        }
                    }
                    // Even a correctly mapped parent must carry the same
                    // content as the original parent.
                    let old_parent_tree = ctx.backend.tree_of(old_parent)?;
                    let new_parent_tree = ctx.backend.tree_of(new_parent)?;
                    if old_parent_tree != new_parent_tree {
                        violations.push(ConsistencyViolation::ParentTreeMismatch {
                            old_parent: old_parent.clone(),
                            new_parent: new_parent.clone(),
                            old_parent_tree,
                            new_parent_tree,
                        });
                    }
                }
                RemapEntry::Pending => {
                    violations.push(ConsistencyViolation::UnresolvedParent {
                        old_parent: old_parent.clone(),
                    });
                }
                RemapEntry::Unmapped => {
                    if !ctx.options.isolate {
                        let Some(new_parent) = new_iter.next() else {
                            violations.push(ConsistencyViolation::MissingParent {
                                old_parent: old_parent.clone(),
                            });
                            continue;
                        };
                        if old_parent != new_parent {
                            violations.push(ConsistencyViolation::ForeignParentReplaced {
                                old_parent: old_parent.clone(),
                                actual: new_parent.clone(),
                            });
                        }
                    } else if new_parents.contains(old_parent) {
                        violations.push(ConsistencyViolation::ForeignParentRetained {
                            old_parent: old_parent.clone(),
                        });
                    }
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConsistencyError {
            old_id: old_id.clone(),
            new_id: new_id.clone(),
            old_tree,
            new_tree,
            old_parents,
            new_parents,
            violations,
        }
        .into())
    }
}
