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

use assert_matches::assert_matches;
use git_duplicate_lib::backend::Backend as _;
use git_duplicate_lib::backend::CommitId;
use git_duplicate_lib::duplicate::DuplicateError;
use git_duplicate_lib::duplicate::DuplicateOptions;
use git_duplicate_lib::duplicate::DuplicateStats;
use git_duplicate_lib::duplicate::duplicate_range;
use testutils::TestBackend;
use testutils::default_signature;
use testutils::tree_id;

fn run(
    backend: &TestBackend,
    old_base: &CommitId,
    tip: &CommitId,
    onto: &CommitId,
    options: &DuplicateOptions,
) -> Result<DuplicateStats, DuplicateError> {
    duplicate_range(backend, old_base, tip, onto, options, &mut |_, _, _, _| {})
}

#[test]
fn test_duplicate_linear_chain() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let c = backend.add_commit("c", &tree_id("c"), &[b.clone()], "c");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let stats = run(&backend, &a, &c, &onto, &DuplicateOptions::default()).unwrap();

    assert_eq!(stats.duplicated_commits.len(), 2);
    assert_eq!(backend.create_count(), 2);
    let new_b = &stats.duplicated_commits[&b];
    let new_c = &stats.duplicated_commits[&c];
    assert_eq!(&stats.new_tip, new_c);
    assert_eq!(backend.parents_of(new_b).unwrap(), vec![onto.clone()]);
    assert_eq!(backend.parents_of(new_c).unwrap(), vec![new_b.clone()]);
    assert_eq!(backend.tree_of(new_b).unwrap(), tree_id("b"));
    assert_eq!(backend.tree_of(new_c).unwrap(), tree_id("c"));
}

#[test]
fn test_duplicate_preserves_metadata() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "multi\nline\n\nmessage\n");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let stats = run(&backend, &a, &b, &onto, &DuplicateOptions::default()).unwrap();

    let metadata = backend.metadata_of(&stats.new_tip).unwrap();
    assert_eq!(metadata.author, default_signature());
    assert_eq!(metadata.message, "multi\nline\n\nmessage\n");
    // Without keep_committer the backend fills in its own committer.
    assert_ne!(metadata.committer, default_signature());
}

#[test]
fn test_duplicate_keep_committer() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let options = DuplicateOptions {
        keep_committer: true,
        ..Default::default()
    };
    let stats = run(&backend, &a, &b, &onto, &options).unwrap();

    let metadata = backend.metadata_of(&stats.new_tip).unwrap();
    assert_eq!(metadata.committer, default_signature());
}

#[test]
fn test_duplicate_diamond_memoization() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let c = backend.add_commit("c", &tree_id("c"), &[a.clone()], "c");
    let m = backend.add_commit("m", &tree_id("m"), &[b.clone(), c.clone()], "m");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let stats = run(&backend, &a, &m, &onto, &DuplicateOptions::default()).unwrap();

    // Both sides of the diamond reach `a`, and `m` reaches `b` and `c`
    // again through the seeding loop, yet each commit is created once.
    assert_eq!(backend.create_count(), 3);
    let new_b = &stats.duplicated_commits[&b];
    let new_c = &stats.duplicated_commits[&c];
    let new_m = &stats.duplicated_commits[&m];
    assert_eq!(backend.parents_of(new_b).unwrap(), vec![onto.clone()]);
    assert_eq!(backend.parents_of(new_c).unwrap(), vec![onto.clone()]);
    assert_eq!(
        backend.parents_of(new_m).unwrap(),
        vec![new_b.clone(), new_c.clone()]
    );
    assert_eq!(&stats.new_tip, new_m);
}

#[test]
fn test_duplicate_external_parent_kept() {
    let backend = TestBackend::new();
    // `x` is an ancestor of the old base, so it stays outside the
    // duplication set even though the merge links to it directly.
    let x = backend.add_commit("x", &tree_id("x"), &[], "x");
    let a = backend.add_commit("a", &tree_id("base"), &[x.clone()], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let m = backend.add_commit("m", &tree_id("m"), &[b.clone(), x.clone()], "m");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let stats = run(&backend, &a, &m, &onto, &DuplicateOptions::default()).unwrap();

    assert_eq!(backend.create_count(), 2);
    let new_b = &stats.duplicated_commits[&b];
    let new_m = &stats.duplicated_commits[&m];
    assert_eq!(
        backend.parents_of(new_m).unwrap(),
        vec![new_b.clone(), x.clone()]
    );
}

#[test]
fn test_duplicate_external_parent_dropped_in_isolate_mode() {
    let backend = TestBackend::new();
    let x = backend.add_commit("x", &tree_id("x"), &[], "x");
    let a = backend.add_commit("a", &tree_id("base"), &[x.clone()], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let m = backend.add_commit("m", &tree_id("m"), &[b.clone(), x.clone()], "m");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let options = DuplicateOptions {
        isolate: true,
        ..Default::default()
    };
    let stats = run(&backend, &a, &m, &onto, &options).unwrap();

    let new_b = &stats.duplicated_commits[&b];
    let new_m = &stats.duplicated_commits[&m];
    // The old base is remapped, not dropped; only `x` loses its edge.
    assert_eq!(backend.parents_of(new_b).unwrap(), vec![onto.clone()]);
    assert_eq!(backend.parents_of(new_m).unwrap(), vec![new_b.clone()]);
}

#[test]
fn test_duplicate_external_first_parent_order() {
    let backend = TestBackend::new();
    let x = backend.add_commit("x", &tree_id("x"), &[], "x");
    let a = backend.add_commit("a", &tree_id("base"), &[x.clone()], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    // The external parent comes first; first-parent semantics must
    // survive the remapping.
    let m = backend.add_commit("m", &tree_id("m"), &[x.clone(), b.clone()], "m");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let stats = run(&backend, &a, &m, &onto, &DuplicateOptions::default()).unwrap();

    let new_b = &stats.duplicated_commits[&b];
    let new_m = &stats.duplicated_commits[&m];
    assert_eq!(
        backend.parents_of(new_m).unwrap(),
        vec![x.clone(), new_b.clone()]
    );
}

#[test]
fn test_duplicate_mismatched_base_trees() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let onto = backend.add_commit("onto", &tree_id("other"), &[], "onto");

    let result = run(&backend, &a, &b, &onto, &DuplicateOptions::default());

    assert_matches!(result, Err(DuplicateError::BaseTreesDiffer { .. }));
    // The precondition aborts the run before anything is created.
    assert_eq!(backend.create_count(), 0);
}

#[test]
fn test_duplicate_empty_range() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let result = run(&backend, &a, &a, &onto, &DuplicateOptions::default());

    assert_matches!(result, Err(DuplicateError::EmptyRange { .. }));
    assert_eq!(backend.create_count(), 0);
}

#[test]
fn test_duplicate_progress_callback() {
    let backend = TestBackend::new();
    let a = backend.add_commit("a", &tree_id("base"), &[], "a");
    let b = backend.add_commit("b", &tree_id("b"), &[a.clone()], "b");
    let c = backend.add_commit("c", &tree_id("c"), &[b.clone()], "c");
    let onto = backend.add_commit("onto", &tree_id("base"), &[], "onto");

    let mut reports = vec![];
    duplicate_range(
        &backend,
        &a,
        &c,
        &onto,
        &DuplicateOptions::default(),
        &mut |old_id, _new_id, done, total| {
            reports.push((old_id.clone(), done, total));
        },
    )
    .unwrap();

    assert_eq!(
        reports,
        vec![(b.clone(), 1, 2), (c.clone(), 2, 2)],
    );
}
