mod common;

use common::{create_commit, create_test_repo, git_available, wait_for_publish};
use gutterline::config::{DiffAlgorithm, IgnoreWhitespace, Settings};
use gutterline::diff::DiffParser;
use gutterline::engine::Engine;
use gutterline::git::operations::diff_args;
use gutterline::git::{TaskQueue, VcsRunner};
use gutterline::host::MemoryHost;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Scenario {
    name: &'static str,
    target: &'static str,
    buffer: &'static str,
    ignore_whitespace: IgnoreWhitespace,
    /// Unified diff as `git diff -U0` prints it.
    diff: &'static str,
    inserted: Vec<usize>,
    modified: Vec<usize>,
    deleted: Vec<usize>,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "single_line_modification",
            target: "A\nB\nC\n",
            buffer: "A\nX\nC\n",
            ignore_whitespace: IgnoreWhitespace::None,
            diff: "@@ -2 +2 @@\n-B\n+X\n",
            inserted: vec![],
            modified: vec![2],
            deleted: vec![],
        },
        Scenario {
            name: "pure_insertion_at_top",
            target: "A\nB\n",
            buffer: "Z\nA\nB\n",
            ignore_whitespace: IgnoreWhitespace::None,
            diff: "@@ -0,0 +1 @@\n+Z\n",
            inserted: vec![1],
            modified: vec![],
            deleted: vec![],
        },
        Scenario {
            name: "pure_deletion_of_second_line",
            target: "A\nB\nC\n",
            buffer: "A\nC\n",
            ignore_whitespace: IgnoreWhitespace::None,
            diff: "@@ -2 +1,0 @@\n-B\n",
            inserted: vec![],
            modified: vec![],
            deleted: vec![2],
        },
        Scenario {
            name: "deletion_at_top",
            target: "A\nB\n",
            buffer: "B\n",
            ignore_whitespace: IgnoreWhitespace::None,
            diff: "@@ -1 +0,0 @@\n-A\n",
            inserted: vec![],
            modified: vec![],
            deleted: vec![1],
        },
        Scenario {
            name: "replace_two_with_one",
            target: "A\nB\n",
            buffer: "C\n",
            ignore_whitespace: IgnoreWhitespace::None,
            diff: "@@ -1,2 +1 @@\n-A\n-B\n+C\n",
            inserted: vec![],
            modified: vec![1],
            deleted: vec![],
        },
        Scenario {
            name: "whitespace_only_change_ignored",
            target: "a b\n",
            buffer: "a  b\n",
            ignore_whitespace: IgnoreWhitespace::All,
            diff: "",
            inserted: vec![],
            modified: vec![],
            deleted: vec![],
        },
    ]
}

#[tokio::test]
async fn test_scenarios_parse_and_git_diff_agree() {
    if !git_available() {
        return;
    }
    let queue = Arc::new(TaskQueue::new().unwrap());
    let runner = VcsRunner::new("git", queue);
    let temp_dir = TempDir::new().unwrap();

    for scenario in scenarios() {
        let target = temp_dir.path().join(format!("{}.target", scenario.name));
        let buffer = temp_dir.path().join(format!("{}.buffer", scenario.name));
        fs::write(&target, scenario.target).unwrap();
        fs::write(&buffer, scenario.buffer).unwrap();

        let output = runner
            .run_diff(
                temp_dir.path(),
                diff_args(
                    scenario.ignore_whitespace,
                    DiffAlgorithm::Minimal,
                    &target,
                    &buffer,
                ),
            )
            .await
            .unwrap();

        let from_git = DiffParser::parse(&String::from_utf8_lossy(&output)).result();
        let from_text = DiffParser::parse(scenario.diff).result();
        assert_eq!(from_git, from_text, "{}", scenario.name);
        assert_eq!(from_git.inserted, scenario.inserted, "{}", scenario.name);
        assert_eq!(from_git.modified, scenario.modified, "{}", scenario.name);
        assert_eq!(from_git.deleted, scenario.deleted, "{}", scenario.name);
    }
}

#[tokio::test]
async fn test_scenarios_through_engine() {
    if !git_available() {
        return;
    }
    let (_temp_dir, repo, repo_path) = create_test_repo().unwrap();
    let scenarios = scenarios();
    for scenario in &scenarios {
        let file = format!("{}.txt", scenario.name);
        create_commit(&repo, &repo_path, &file, scenario.target, scenario.name).unwrap();
    }

    let host = Arc::new(MemoryHost::new());
    let user = Settings {
        debounce_delay: Some(200),
        ..Default::default()
    };
    let engine = Engine::new(host.clone(), user).unwrap();

    for (id, scenario) in scenarios.iter().enumerate() {
        let buffer = id as u64 + 1;
        host.open(
            buffer,
            repo_path.join(format!("{}.txt", scenario.name)),
            scenario.buffer,
        );
        host.set_settings(
            buffer,
            Settings {
                ignore_whitespace: Some(scenario.ignore_whitespace),
                ..Default::default()
            },
        );
        engine.on_load(buffer);
    }

    for (id, scenario) in scenarios.iter().enumerate() {
        let publication = wait_for_publish(&host, id as u64 + 1, 0).await;
        let expected = DiffParser::parse(scenario.diff).result();
        assert_eq!(publication.regions, expected, "{}", scenario.name);
        assert_eq!(
            publication.status.lines_inserted,
            scenario.inserted.len(),
            "{}",
            scenario.name
        );
        assert_eq!(
            publication.status.lines_modified,
            scenario.modified.len(),
            "{}",
            scenario.name
        );
    }
}

#[tokio::test]
async fn test_edit_after_load_updates_regions() {
    if !git_available() {
        return;
    }
    let (_temp_dir, repo, repo_path) = create_test_repo().unwrap();
    create_commit(&repo, &repo_path, "notes.txt", "one\ntwo\nthree\n", "Initial").unwrap();

    let host = Arc::new(MemoryHost::new());
    let user = Settings {
        debounce_delay: Some(200),
        live_mode: Some(true),
        ..Default::default()
    };
    let engine = Engine::new(host.clone(), user).unwrap();
    host.open(1, repo_path.join("notes.txt"), "one\ntwo\nthree\n");
    engine.on_load(1);

    let publication = wait_for_publish(&host, 1, 0).await;
    assert!(publication.regions.is_empty());
    assert_eq!(
        publication.status_text.as_deref().map(|text| text.contains("Comparing")),
        Some(false)
    );

    host.edit(1, "one\n2\nthree\nfour\n");
    engine.on_modified(1);
    let publication = wait_for_publish(&host, 1, 1).await;
    assert_eq!(publication.regions.modified, vec![2]);
    assert_eq!(publication.regions.inserted, vec![4]);
    assert_eq!(publication.status.lines_inserted, 1);
    assert_eq!(publication.status.lines_modified, 1);

    let change = publication.parser.line_change(2, true);
    assert_eq!(change.deleted_lines, vec!["two"]);
}
