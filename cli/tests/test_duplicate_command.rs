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

use std::path::Path;
use std::process::Output;

use tempfile::TempDir;

/// A scratch git repository driven through the real git binary, the same
/// way the tool itself drives it.
struct GitRepo {
    dir: TempDir,
}

impl GitRepo {
    fn init() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Self { dir };
        repo.git(&["init", "-q", "-b", "main"]);
        repo
    }

    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    fn git_output(&self, args: &[&str]) -> Output {
        std::process::Command::new("git")
            .arg("-C")
            .arg(self.workdir())
            .args(args)
            .env("GIT_AUTHOR_NAME", "Test User")
            .env("GIT_AUTHOR_EMAIL", "test.user@example.com")
            .env("GIT_AUTHOR_DATE", "2001-02-03T04:05:06+07:00")
            .env("GIT_COMMITTER_NAME", "Test User")
            .env("GIT_COMMITTER_EMAIL", "test.user@example.com")
            .env("GIT_COMMITTER_DATE", "2001-02-03T04:05:06+07:00")
            .output()
            .unwrap()
    }

    fn git(&self, args: &[&str]) -> String {
        let output = self.git_output(args);
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_owned()
    }

    /// Writes `content` to `file`, commits it on top of the current HEAD,
    /// and returns the new commit id.
    fn commit_file(&self, file: &str, content: &str, message: &str) -> String {
        std::fs::write(self.workdir().join(file), content).unwrap();
        self.git(&["add", file]);
        self.git(&["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Creates a commit with the same tree as `base` on top of `base`.
    fn empty_commit_on(&self, base: &str, message: &str) -> String {
        self.git(&["checkout", "-q", base]);
        self.git(&["commit", "-q", "--allow-empty", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    fn checkout(&self, revision: &str) {
        self.git(&["checkout", "-q", revision]);
    }

    fn tree_of(&self, revision: &str) -> String {
        self.git(&["rev-parse", &format!("{revision}^{{tree}}")])
    }

    fn parents_of(&self, revision: &str) -> Vec<String> {
        let line = self.git(&["rev-list", "-1", "--parents", revision]);
        line.split_whitespace().skip(1).map(str::to_owned).collect()
    }

    fn message_of(&self, revision: &str) -> String {
        self.git(&["log", "-1", "--format=%B", revision])
    }
}

fn duplicate_cmd(repo: &GitRepo) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("git-duplicate").unwrap();
    cmd.current_dir(repo.workdir());
    cmd
}

fn run(cmd: &mut assert_cmd::Command) -> (Output, String, String) {
    let output = cmd.output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    (output, stdout, stderr)
}

#[test]
fn test_duplicate_linear_chain() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    let c = repo.commit_file("file2", "2\n", "c");
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), c.as_str(), "--onto", onto.as_str()]));
    assert!(output.status.success(), "{stderr}");

    let new_tip = stdout.trim();
    assert_eq!(stdout, format!("{new_tip}\n"));
    assert_eq!(new_tip.len(), 40);
    assert_ne!(new_tip, c);

    assert_eq!(repo.tree_of(new_tip), repo.tree_of(&c));
    let new_b = &repo.parents_of(new_tip)[0];
    assert_eq!(repo.tree_of(new_b), repo.tree_of(&b));
    assert_eq!(repo.parents_of(new_b), vec![onto.clone()]);
    assert_eq!(repo.message_of(new_tip), repo.message_of(&c));
}

#[test]
fn test_duplicate_merge_commit() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    repo.checkout(&a);
    let c = repo.commit_file("file2", "2\n", "c");
    repo.checkout(&b);
    repo.git(&["merge", "-q", "-m", "m", &c]);
    let m = repo.git(&["rev-parse", "HEAD"]);
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), m.as_str(), "--onto", onto.as_str()]));
    assert!(output.status.success(), "{stderr}");

    let new_m = stdout.trim();
    let new_parents = repo.parents_of(new_m);
    assert_eq!(new_parents.len(), 2);
    assert_eq!(repo.tree_of(&new_parents[0]), repo.tree_of(&b));
    assert_eq!(repo.tree_of(&new_parents[1]), repo.tree_of(&c));
    assert_eq!(repo.tree_of(new_m), repo.tree_of(&m));
}

#[test]
fn test_duplicate_external_parent() {
    let repo = GitRepo::init();
    let x = repo.commit_file("f0", "0\n", "x");
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    // A merge linking straight to `x`, which stays outside the duplicated
    // range because it is an ancestor of `a`.
    let tree = repo.tree_of(&b);
    let m = repo.git(&["commit-tree", &tree, "-p", &b, "-p", &x, "-m", "m"]);
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), m.as_str(), "--onto", onto.as_str()]));
    assert!(output.status.success(), "{stderr}");
    let new_m = stdout.trim();
    let new_parents = repo.parents_of(new_m);
    assert_eq!(new_parents.len(), 2);
    // The external parent is carried over unchanged.
    assert_eq!(new_parents[1], x);
    assert_eq!(repo.tree_of(&new_parents[0]), repo.tree_of(&b));

    let (output, stdout, stderr) =
        run(duplicate_cmd(&repo).args([a.as_str(), m.as_str(), "--onto", onto.as_str(), "--isolate"]));
    assert!(output.status.success(), "{stderr}");
    let new_m = stdout.trim();
    let new_parents = repo.parents_of(new_m);
    // In isolate mode the link to `x` is dropped.
    assert_eq!(new_parents.len(), 1);
    assert_eq!(repo.tree_of(&new_parents[0]), repo.tree_of(&b));
}

#[test]
fn test_duplicate_mismatched_base_trees() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    repo.checkout(&a);
    let onto = repo.commit_file("other", "other\n", "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), b.as_str(), "--onto", onto.as_str()]));
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout, "");
    assert!(stderr.contains("trees"), "{stderr}");
}

#[test]
fn test_duplicate_empty_range() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), a.as_str(), "--onto", onto.as_str()]));
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout, "");
    assert!(stderr.contains("empty"), "{stderr}");
}

#[test]
fn test_duplicate_unknown_revision() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), "no-such-rev"]));
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout, "");
    assert!(stderr.contains("no-such-rev"), "{stderr}");
}

#[test]
fn test_duplicate_onto_defaults_to_head() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    // HEAD becomes the onto commit.
    repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) = run(duplicate_cmd(&repo).args([a.as_str(), b.as_str()]));
    assert!(output.status.success(), "{stderr}");
    assert_eq!(repo.tree_of(stdout.trim()), repo.tree_of(&b));
}

#[test]
fn test_duplicate_verbose_mappings() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    let c = repo.commit_file("file2", "2\n", "c");
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) =
        run(duplicate_cmd(&repo).args([a.as_str(), c.as_str(), "--onto", onto.as_str(), "--verbose"]));
    assert!(output.status.success(), "{stderr}");
    // One mapping line per duplicated commit, on stderr only.
    assert_eq!(stdout.lines().count(), 1);
    let mapping_lines: Vec<&str> = stderr.lines().filter(|l| l.contains(" -> ")).collect();
    assert_eq!(mapping_lines.len(), 2);
    assert!(mapping_lines[0].starts_with(&b), "{stderr}");
    assert!(mapping_lines[1].starts_with(&c), "{stderr}");
}

#[test]
fn test_duplicate_verify_clean_run() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) =
        run(duplicate_cmd(&repo).args([a.as_str(), b.as_str(), "--onto", onto.as_str(), "--verify"]));
    assert!(output.status.success(), "{stderr}");
    assert_eq!(repo.tree_of(stdout.trim()), repo.tree_of(&b));
}

#[test]
fn test_duplicate_keep_committer() {
    let repo = GitRepo::init();
    let a = repo.commit_file("base", "base\n", "a");
    let b = repo.commit_file("file1", "1\n", "b");
    let onto = repo.empty_commit_on(&a, "onto");

    let (output, stdout, stderr) =
        run(duplicate_cmd(&repo).args([a.as_str(), b.as_str(), "--onto", onto.as_str(), "--keep-committer"]));
    assert!(output.status.success(), "{stderr}");
    let new_b = stdout.trim().to_owned();
    assert_eq!(
        repo.git(&["log", "-1", "--format=%cn <%ce> %cD", &new_b]),
        repo.git(&["log", "-1", "--format=%cn <%ce> %cD", &b]),
    );
}
