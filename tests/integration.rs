use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qry_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qry");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Create config
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // Create test files
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    ).unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    ).unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains details about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    ).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/qry.sqlite"

[index]
root = "{}/files"

[search]
default_limit = 20

[similarity]
related_limit = 5
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("qry.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qry(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qry_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qry binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qry(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("qry.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    // Run init twice
    let (_, _, success1) = run_qry(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_qry(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_counts_files() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    let (stdout, stderr, success) = run_qry(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("added:     3"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_index_unchanged_on_rerun() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    // Second pass with no filesystem changes touches nothing
    let (stdout, _, success) = run_qry(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("added:     0"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 3"), "got: {}", stdout);
}

#[test]
fn test_index_detects_content_change() {
    let (tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    fs::write(
        tmp.path().join("files").join("alpha.md"),
        "# Alpha Document Updated\n\nThis file was modified.",
    )
    .unwrap();

    let (stdout, _, success) = run_qry(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("updated:   1"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 2"), "got: {}", stdout);
}

#[test]
fn test_index_removes_deleted_files() {
    let (tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stats_before, _, _) = run_qry(&config_path, &["stats"]);

    fs::remove_file(tmp.path().join("files").join("gamma.txt")).unwrap();
    let (stdout, _, success) = run_qry(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("deleted:   1"), "got: {}", stdout);

    // Deleted file no longer surfaces in search
    let (search_out, _, _) = run_qry(&config_path, &["search", "Kubernetes"]);
    assert!(
        !search_out.contains("gamma.txt"),
        "Deleted file still in results: {}",
        search_out
    );

    // The aggregate fingerprint moved with the corpus
    let (stats_after, _, _) = run_qry(&config_path, &["stats"]);
    let fp = |out: &str| {
        out.lines()
            .find(|l| l.contains("Fingerprint:"))
            .map(|l| l.trim().to_string())
    };
    assert_ne!(fp(&stats_before), fp(&stats_after));
}

#[test]
fn test_index_full_reindexes_everything() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["index", "--full"]);
    assert!(success);
    assert!(stdout.contains("added:     3"), "got: {}", stdout);
}

#[test]
fn test_incremental_pass_converges_with_full_reindex() {
    let (tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    // Mutate the corpus: edit one file, add one, delete one
    let files_dir = tmp.path().join("files");
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nRewritten body about Rust tooling.\n",
    )
    .unwrap();
    fs::write(files_dir.join("delta.md"), "# Delta\n\nBrand new file.\n").unwrap();
    fs::remove_file(files_dir.join("gamma.txt")).unwrap();

    let (stdout, _, success) = run_qry(&config_path, &["index"]);
    assert!(success, "incremental pass failed: {}", stdout);

    let committed_state = |out: &str| {
        let line = |needle: &str| {
            out.lines()
                .find(|l| l.contains(needle))
                .map(|l| l.trim().to_string())
        };
        (line("Fingerprint:"), line("Documents:"))
    };

    let (stats_incremental, _, _) = run_qry(&config_path, &["stats"]);
    let incremental = committed_state(&stats_incremental);
    assert!(incremental.0.is_some(), "got: {}", stats_incremental);

    // Rebuilding the same tree from empty must land on the same state
    let (stdout, _, success) = run_qry(&config_path, &["index", "--full"]);
    assert!(success, "full pass failed: {}", stdout);
    assert!(stdout.contains("added:     3"), "got: {}", stdout);

    let (stats_full, _, _) = run_qry(&config_path, &["stats"]);
    assert_eq!(
        incremental,
        committed_state(&stats_full),
        "incremental and from-scratch passes diverged:\n{}\nvs\n{}",
        stats_incremental,
        stats_full
    );
}

#[test]
fn test_diff_previews_without_writing() {
    let (tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    fs::write(tmp.path().join("files").join("delta.md"), "# Delta\n\nNew file.").unwrap();

    let (stdout, _, success) = run_qry(&config_path, &["diff"]);
    assert!(success);
    assert!(stdout.contains("+ delta.md"), "got: {}", stdout);

    // diff must not have committed anything
    let (stdout, _, _) = run_qry(&config_path, &["index"]);
    assert!(stdout.contains("added:     1"), "got: {}", stdout);
}

#[test]
fn test_search_finds_indexed_content() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["search", "Rust programming"]);
    assert!(success, "search failed");
    assert!(
        stdout.contains("alpha.md"),
        "Expected alpha.md in results, got: {}",
        stdout
    );
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout1, _, _) = run_qry(&config_path, &["search", "document", "--no-recency"]);
    let (stdout2, _, _) = run_qry(&config_path, &["search", "document", "--no-recency"]);
    assert_eq!(
        stdout1, stdout2,
        "Search results should be deterministic across runs"
    );
}

#[test]
fn test_search_empty_query_rejected() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    let (_, stderr, success) = run_qry(&config_path, &["search", ""]);
    assert!(!success, "Empty query should be rejected");
    assert!(
        stderr.contains("invalid input"),
        "Should report invalid input, got: {}",
        stderr
    );
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["search", "xyznonexistent"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_related_ranks_overlapping_documents() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    // alpha and beta share "document"; the target itself never ranks
    let (stdout, stderr, success) = run_qry(&config_path, &["related", "alpha.md"]);
    assert!(success, "related failed: {}", stderr);
    assert!(stdout.contains("beta.md"), "got: {}", stdout);
    let target_ranked = stdout
        .lines()
        .filter(|l| l.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit()))
        .any(|l| l.contains("alpha.md"));
    assert!(!target_ranked, "Target ranked against itself: {}", stdout);
}

#[test]
fn test_related_unknown_file_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (_, stderr, success) = run_qry(&config_path, &["related", "nope.md"]);
    assert!(!success, "related with unknown file should fail");
    assert!(
        stderr.contains("not indexed"),
        "Should report not indexed, got: {}",
        stderr
    );
}

#[test]
fn test_duplicates_finds_identical_files() {
    let (tmp, config_path) = setup_test_env();

    let files_dir = tmp.path().join("files");
    fs::write(files_dir.join("copy-a.md"), "# Intro\nhello world\n").unwrap();
    fs::write(files_dir.join("copy-b.md"), "# Intro\nhello world\n").unwrap();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["duplicates"]);
    assert!(success);
    assert!(stdout.contains("Exact duplicates"), "got: {}", stdout);
    assert!(stdout.contains("copy-a.md"), "got: {}", stdout);
    assert!(stdout.contains("copy-b.md"), "got: {}", stdout);
}

#[test]
fn test_duplicates_none_in_distinct_corpus() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["duplicates"]);
    assert!(success);
    assert!(stdout.contains("No duplicates"), "got: {}", stdout);
}

#[test]
fn test_links_reports_broken_targets() {
    let (tmp, config_path) = setup_test_env();

    fs::write(
        tmp.path().join("files").join("hub.md"),
        "# Hub\n\nSee [[alpha]] and [beta](beta.md).\n\nAlso [gone](missing.md).\n",
    )
    .unwrap();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["links"]);
    assert!(success);
    assert!(
        stdout.contains("missing.md"),
        "Expected broken target reported, got: {}",
        stdout
    );
    assert!(
        !stdout.contains("broken link -> alpha"),
        "Resolvable wiki link flagged: {}",
        stdout
    );
    assert!(stdout.contains("1 broken"), "got: {}", stdout);
    assert!(stdout.contains("2 valid"), "got: {}", stdout);
}

#[test]
fn test_links_clean_corpus() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["links"]);
    assert!(success);
    assert!(stdout.contains("No broken links"));
}

#[test]
fn test_refs_finds_mentions() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["refs", "alpha"]);
    assert!(success);
    assert!(stdout.contains("alpha.md"), "got: {}", stdout);
    assert!(stdout.contains("reference"), "got: {}", stdout);
}

#[test]
fn test_mount_index_unmount_cycle() {
    let (tmp, config_path) = setup_test_env();

    // A second directory mounted under an alias
    let extra_dir = tmp.path().join("extra");
    fs::create_dir_all(&extra_dir).unwrap();
    fs::write(
        extra_dir.join("vendor.md"),
        "# Vendor Notes\n\nInvoices and purchase orders for the quarter.\n",
    )
    .unwrap();

    run_qry(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_qry(&config_path, &["mount", "extra", extra_dir.to_str().unwrap()]);
    assert!(success, "mount failed: {}{}", stdout, stderr);
    assert!(stdout.contains("mounted extra"));

    // With a mount present, the pass indexes the mount under its alias
    let (stdout, _, success) = run_qry(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("added:     1"), "got: {}", stdout);

    let (stdout, _, _) = run_qry(&config_path, &["search", "invoices"]);
    assert!(stdout.contains("extra/vendor.md"), "got: {}", stdout);

    let (stdout, _, _) = run_qry(&config_path, &["sources"]);
    assert!(stdout.contains("extra"), "got: {}", stdout);

    let (stdout, _, success) = run_qry(&config_path, &["unmount", "extra"]);
    assert!(success);
    assert!(stdout.contains("1 documents removed"), "got: {}", stdout);

    let (stdout, _, _) = run_qry(&config_path, &["search", "invoices"]);
    assert!(
        !stdout.contains("extra/vendor.md"),
        "Unmounted document still in results: {}",
        stdout
    );
}

#[test]
fn test_mount_duplicate_alias_rejected() {
    let (tmp, config_path) = setup_test_env();

    let extra_dir = tmp.path().join("extra");
    fs::create_dir_all(&extra_dir).unwrap();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["mount", "extra", extra_dir.to_str().unwrap()]);
    let (_, stderr, success) =
        run_qry(&config_path, &["mount", "extra", extra_dir.to_str().unwrap()]);
    assert!(!success, "Duplicate alias should fail");
    assert!(stderr.contains("already mounted"), "got: {}", stderr);
}

#[test]
fn test_unmount_unknown_alias_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    let (_, stderr, success) = run_qry(&config_path, &["unmount", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("no mount named"), "got: {}", stderr);
}

#[test]
fn test_stats_summarizes_store() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    let (stdout, _, success) = run_qry(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"), "got: {}", stdout);
    assert!(stdout.contains("Fingerprint:"), "got: {}", stdout);
    assert!(stdout.contains("markdown"), "got: {}", stdout);
}

#[test]
fn test_commands_require_initialized_store() {
    let (_tmp, config_path) = setup_test_env();

    // No init: read-only commands refuse to materialize an empty store
    let (_, stderr, success) = run_qry(&config_path, &["search", "anything"]);
    assert!(!success);
    assert!(
        stderr.contains("not initialized"),
        "Should mention init, got: {}",
        stderr
    );
}

#[test]
fn test_grep_finds_lexical_matches() {
    let (_tmp, config_path) = setup_test_env();

    run_qry(&config_path, &["init"]);
    run_qry(&config_path, &["index"]);

    // grep hard-depends on ripgrep; skip quietly where it is absent
    if which::which("rg").is_err() {
        return;
    }

    let (stdout, _, success) = run_qry(&config_path, &["grep", "Kubernetes"]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"), "got: {}", stdout);
    assert!(stdout.contains("matches in"), "got: {}", stdout);
}
