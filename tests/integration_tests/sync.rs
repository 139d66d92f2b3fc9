use insta_cmd::assert_cmd_snapshot;
use rstest::rstest;

use crate::common::{TestWorkspace, workspace, workspace_with_remote};

#[rstest]
fn test_sync_fast_forwards_behind_worktree(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;
    let wt = ws.arb_create("feature");
    ws.push_branch("feature");
    let remote_head = ws.advance_remote("feature", "Remote work");

    let settings = ws.snapshot_settings();
    settings.bind(|| {
        let mut cmd = ws.arb_command();
        cmd.arg("sync");

        assert_cmd_snapshot!(cmd, @r"
        success: true
        exit_code: 0
        ----- stdout -----
        feature: updated
        1 updated, 0 conflicts, 0 without remote branch, 0 detached

        ----- stderr -----
        ");
    });

    assert_eq!(
        ws.git_output_in(&wt, &["rev-parse", "HEAD"]),
        remote_head,
        "worktree must sit on the new remote head"
    );
}

#[rstest]
fn test_sync_reports_missing_remote_branch(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;

    // The branch only exists locally; nothing to pull.
    ws.arb_create("local-only");

    let settings = ws.snapshot_settings();
    settings.bind(|| {
        let mut cmd = ws.arb_command();
        cmd.arg("sync");

        assert_cmd_snapshot!(cmd, @r"
        success: true
        exit_code: 0
        ----- stdout -----
        local-only: no-remote-tracking
        0 updated, 0 conflicts, 1 without remote branch, 0 detached

        ----- stderr -----
        ");
    });
}

#[rstest]
fn test_sync_conflict_does_not_stop_other_worktrees(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;

    // "clean" can fast-forward; "feature" has diverged from its remote.
    let clean = ws.arb_create("clean");
    ws.push_branch("clean");
    let clean_remote_head = ws.advance_remote("clean", "Remote only");

    let feature = ws.arb_create("feature");
    ws.push_branch("feature");
    ws.commit_in(&feature, "Local change");
    ws.advance_remote("feature", "Remote change");

    let output = ws.arb_command().arg("sync").output().unwrap();
    assert_eq!(output.status.code(), Some(10));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("clean: updated"), "{stdout}");
    assert!(stdout.contains("feature: conflict ("), "{stdout}");
    assert!(
        stdout.contains("1 updated, 1 conflicts, 0 without remote branch, 0 detached"),
        "{stdout}"
    );
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("Sync conflict in feature"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // The clean worktree really moved; the diverged one kept its commit.
    assert_eq!(
        ws.git_output_in(&clean, &["rev-parse", "HEAD"]),
        clean_remote_head
    );
    assert_eq!(
        ws.git_output_in(&feature, &["log", "-1", "--format=%s"]),
        "Local change"
    );
}

#[rstest]
fn test_sync_continues_past_a_middle_conflict(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;

    // Registry order is path-sorted, so the diverged worktree sits between
    // two healthy ones and the run must carry on past it.
    let alpha = ws.arb_create("alpha");
    ws.push_branch("alpha");
    let alpha_remote_head = ws.advance_remote("alpha", "Remote alpha");

    let beta = ws.arb_create("beta");
    ws.push_branch("beta");
    ws.commit_in(&beta, "Local beta");
    ws.advance_remote("beta", "Remote beta");

    let gamma = ws.arb_create("gamma");
    ws.push_branch("gamma");
    let gamma_remote_head = ws.advance_remote("gamma", "Remote gamma");

    let output = ws.arb_command().arg("sync").output().unwrap();
    assert_eq!(output.status.code(), Some(10));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let positions: Vec<usize> = ["alpha: updated", "beta: conflict (", "gamma: updated"]
        .iter()
        .map(|needle| {
            stdout
                .find(needle)
                .unwrap_or_else(|| panic!("missing '{needle}' in: {stdout}"))
        })
        .collect();
    assert!(
        positions[0] < positions[1] && positions[1] < positions[2],
        "outcomes out of registry order: {stdout}"
    );
    assert!(
        stdout.contains("2 updated, 1 conflicts, 0 without remote branch, 0 detached"),
        "{stdout}"
    );

    // Both healthy worktrees really moved; the diverged one kept its commit.
    assert_eq!(ws.git_output_in(&alpha, &["rev-parse", "HEAD"]), alpha_remote_head);
    assert_eq!(ws.git_output_in(&gamma, &["rev-parse", "HEAD"]), gamma_remote_head);
    assert_eq!(
        ws.git_output_in(&beta, &["log", "-1", "--format=%s"]),
        "Local beta"
    );
}

#[rstest]
fn test_sync_skips_detached_head(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;
    let wt = ws.arb_create("parked");
    ws.run_git_in(&wt, &["checkout", "-q", "--detach"]);

    let settings = ws.snapshot_settings();
    settings.bind(|| {
        let mut cmd = ws.arb_command();
        cmd.arg("sync");

        assert_cmd_snapshot!(cmd, @r"
        success: true
        exit_code: 0
        ----- stdout -----
        parked: skipped-detached
        0 updated, 0 conflicts, 0 without remote branch, 1 detached

        ----- stderr -----
        ");
    });
}

#[rstest]
fn test_sync_with_no_worktrees(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;

    let settings = ws.snapshot_settings();
    settings.bind(|| {
        let mut cmd = ws.arb_command();
        cmd.arg("sync");

        assert_cmd_snapshot!(cmd, @r"
        success: true
        exit_code: 0
        ----- stdout -----
        0 updated, 0 conflicts, 0 without remote branch, 0 detached

        ----- stderr -----
        ");
    });
}

#[rstest]
fn test_sync_without_remote_fails(workspace: TestWorkspace) {
    // No remote is configured anywhere; the initial fetch is fatal.
    workspace.arb_create("feature");

    let output = workspace.arb_command().arg("sync").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("origin"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[rstest]
fn test_sync_remote_override_from_config(workspace_with_remote: TestWorkspace) {
    let ws = workspace_with_remote;
    ws.arb_create("feature");

    // The configured remote wins over the repository's own remotes.
    ws.write_config("remote = \"nosuch\"\n");

    let output = ws.arb_command().arg("sync").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("nosuch"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
