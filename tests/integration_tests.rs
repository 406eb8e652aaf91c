//! Integration tests for phonelist
//!
//! Full 10,000,000-number runs are marked `#[ignore]`; the rest seed a
//! progress record near the end of the number space so each run only
//! generates the tail.

use clap::Parser;
use phonelist::checkpoint::{ProgressRecord, ProgressStore};
use phonelist::config::{CliArgs, RunConfig};
use phonelist::engine::{RunController, RunState};
use phonelist::error::GenError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn config(dir: &Path, args: &[&str]) -> RunConfig {
    let checkpoint = dir.join("progress.json");
    let mut argv = vec![
        "phonelist".to_string(),
        "-q".to_string(),
        "--checkpoint".to_string(),
        checkpoint.display().to_string(),
    ];
    argv.extend(args.iter().map(|a| a.to_string()));
    RunConfig::from_args(CliArgs::try_parse_from(argv).unwrap()).unwrap()
}

fn merged_config(dir: &Path, args: &[&str]) -> RunConfig {
    let out = dir.join("out.txt").display().to_string();
    let mut all = vec!["-o", out.as_str()];
    all.extend_from_slice(args);
    config(dir, &all)
}

fn seed(config: &RunConfig, offsets: Vec<u64>) {
    ProgressStore::new(&config.checkpoint_path)
        .save(&ProgressRecord::new(config.identity(), offsets))
        .unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_resumed_tail_completes() {
    let dir = tempdir().unwrap();
    let config = merged_config(
        dir.path(),
        &["-c", "1", "-a", "212", "--chunk-size", "1000", "-w", "4"],
    );
    seed(&config, vec![9_990_000]);

    let controller = RunController::new(config.clone());
    assert_eq!(controller.resume_point().map(|r| r.start_from), Some(9_990_000));

    let outcome = controller.run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.numbers_written, 10_000);
    assert_eq!(outcome.chunks_written, 10);
    assert_eq!(outcome.resumed_from, Some(9_990_000));
    assert!(!config.checkpoint_path.exists());

    let mut lines = read_lines(&config.outputs[0]);
    assert_eq!(lines.len(), 10_000);
    assert!(lines.iter().all(|l| l.len() == 11));
    lines.sort();
    lines.dedup();
    assert_eq!(lines.len(), 10_000);
    assert_eq!(lines.first().unwrap(), "12129990000");
    assert_eq!(lines.last().unwrap(), "12129999999");
}

#[test]
fn test_resume_appends_to_existing_output() {
    let dir = tempdir().unwrap();
    let config = merged_config(
        dir.path(),
        &["-c", "1", "-a", "212", "--chunk-size", "500", "--format", "plus"],
    );
    fs::write(&config.outputs[0], "+12129998999\n").unwrap();
    seed(&config, vec![9_999_000]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);

    let lines = read_lines(&config.outputs[0]);
    assert_eq!(lines.len(), 1_001);
    assert_eq!(lines[0], "+12129998999");
    assert!(lines.iter().all(|l| l.starts_with("+1212")));
}

#[test]
fn test_per_prefix_layout_with_offsets() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("lists");
    let out_dir_arg = out_dir.display().to_string();
    let config = config(
        dir.path(),
        &[
            "-p", "1:212", "-p", "44:20", "--layout", "per-prefix", "--output-dir",
            out_dir_arg.as_str(), "--chunk-size", "1000", "-w", "3",
        ],
    );
    seed(&config, vec![9_995_000, 9_998_000]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.numbers_written, 7_000);

    let us = read_lines(&out_dir.join("numbers_1212.txt"));
    let uk = read_lines(&out_dir.join("numbers_4420.txt"));
    assert_eq!(us.len(), 5_000);
    assert_eq!(uk.len(), 2_000);
    assert!(us.iter().all(|l| l.starts_with("1212")));
    assert!(uk.iter().all(|l| l.starts_with("4420") && l.len() == 11));
    assert!(uk.contains(&"44209998000".to_string()));
}

#[test]
fn test_interrupt_then_resume() {
    let dir = tempdir().unwrap();
    let config = merged_config(
        dir.path(),
        &["-c", "1", "-a", "212", "--chunk-size", "1000", "-w", "2"],
    );
    seed(&config, vec![9_900_000]);

    let controller = RunController::new(config.clone());
    let shutdown = controller.shutdown_flag();
    let outcome = controller
        .run_with(|_| shutdown.store(true, Ordering::SeqCst))
        .unwrap();

    assert_eq!(outcome.state, RunState::Interrupted);
    assert!(!outcome.abandoned);
    let reached = outcome.offsets[0];
    assert!(reached > 9_900_000 && reached < 10_000_000);

    // Completed chunks are contiguous, so the file holds exactly the saved range
    let lines = read_lines(&config.outputs[0]);
    assert_eq!(lines.len() as u64, reached - 9_900_000);

    let saved = ProgressStore::new(&config.checkpoint_path)
        .load(&config.identity())
        .unwrap();
    assert_eq!(saved.start_from, reached);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.resumed_from, Some(reached));

    let lines = read_lines(&config.outputs[0]);
    assert_eq!(lines.len(), 100_000);
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), 100_000);
    assert!(unique.contains(&"12129900000".to_string()));
    assert!(unique.contains(&"12129999999".to_string()));
    assert!(!config.checkpoint_path.exists());
}

#[test]
fn test_merged_two_prefixes_interrupt_then_resume() {
    let dir = tempdir().unwrap();
    let config = merged_config(
        dir.path(),
        &["-c", "1", "-a", "212,646", "--chunk-size", "1000", "-w", "4"],
    );
    seed(&config, vec![9_998_000, 9_900_000]);

    // Stop once work has reached the second prefix
    let controller = RunController::new(config.clone());
    let shutdown = controller.shutdown_flag();
    let outcome = controller
        .run_with(|p| {
            if p.chunks_written >= 4 {
                shutdown.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();

    assert_eq!(outcome.state, RunState::Interrupted);
    assert!(!outcome.abandoned);
    assert_eq!(outcome.offsets[0], 10_000_000);
    let reached = outcome.offsets[1];
    assert!(reached > 9_900_000 && reached < 10_000_000);

    let lines = read_lines(&config.outputs[0]);
    assert!(lines.iter().all(|l| l.len() == 11));
    let first = lines.iter().filter(|l| l.starts_with("1212")).count();
    let second = lines.iter().filter(|l| l.starts_with("1646")).count();
    assert_eq!(first, 2_000);
    assert_eq!(second as u64, reached - 9_900_000);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.resumed_from, Some(reached));

    let lines = read_lines(&config.outputs[0]);
    assert_eq!(lines.len(), 102_000);
    assert!(lines.iter().all(|l| l.len() == 11 && l.bytes().all(|b| b.is_ascii_digit())));
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), 102_000);
    assert_eq!(lines.iter().filter(|l| l.starts_with("1212")).count(), 2_000);
    assert_eq!(lines.iter().filter(|l| l.starts_with("1646")).count(), 100_000);
    assert!(unique.contains(&"12129998000".to_string()));
    assert!(unique.contains(&"16469999999".to_string()));
}

#[test]
fn test_drain_timeout_abandons_in_flight_chunks() {
    let dir = tempdir().unwrap();
    let config = merged_config(
        dir.path(),
        &[
            "-c", "1", "-a", "212", "--chunk-size", "1000", "-w", "2", "--drain-timeout", "0",
        ],
    );
    seed(&config, vec![9_000_000]);

    let controller = RunController::new(config.clone());
    let shutdown = controller.shutdown_flag();
    let outcome = controller
        .run_with(|_| shutdown.store(true, Ordering::SeqCst))
        .unwrap();

    assert!(outcome.abandoned);
    assert_eq!(outcome.state, RunState::Interrupted);
    let reached = outcome.offsets[0];
    assert!(reached > 9_000_000 && reached < 10_000_000);

    let saved = ProgressStore::new(&config.checkpoint_path)
        .load(&config.identity())
        .unwrap();
    assert_eq!(saved.offsets_for(1), outcome.offsets);

    // Everything below the saved offset is already on disk
    let size = fs::metadata(&config.outputs[0]).unwrap().len();
    assert!(size >= (reached - 9_000_000) * 12);
}

#[test]
fn test_mismatched_progress_is_ignored() {
    let dir = tempdir().unwrap();
    let config_212 = merged_config(dir.path(), &["-c", "1", "-a", "212"]);
    let config_646 = merged_config(dir.path(), &["-c", "1", "-a", "646"]);
    seed(&config_212, vec![5_000_000]);

    assert!(RunController::new(config_646).resume_point().is_none());
    assert!(RunController::new(config_212.clone()).resume_point().is_some());

    let plus = merged_config(dir.path(), &["-c", "1", "-a", "212", "--format", "plus"]);
    assert!(RunController::new(plus).resume_point().is_none());
}

#[test]
fn test_resume_no_discards_progress() {
    let dir = tempdir().unwrap();
    let config = merged_config(dir.path(), &["-c", "1", "-a", "212", "--resume", "no"]);
    seed(&config, vec![5_000_000]);

    let controller = RunController::new(config);
    assert!(controller.resume_point().is_none());
    assert_eq!(controller.start_offsets(), vec![0]);
    assert_eq!(controller.state(), RunState::Configuring);
}

#[test]
fn test_unopenable_output_fails_before_running() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("a-directory");
    fs::create_dir(&target).unwrap();
    let target_arg = target.display().to_string();

    let config = config(dir.path(), &["-c", "1", "-a", "212", "-o", target_arg.as_str()]);
    let err = RunController::new(config).run().unwrap_err();
    assert!(matches!(err, GenError::Write(_)));
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_failure_aborts_and_keeps_progress() {
    let dir = tempdir().unwrap();
    let config = config(
        dir.path(),
        &["-c", "1", "-a", "212", "-o", "/dev/full", "--chunk-size", "1000", "-w", "2"],
    );
    seed(&config, vec![9_990_000]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Failed);
    assert!(!outcome.failed.is_empty());
    assert_eq!(outcome.chunks_written, 0);
    assert_eq!(outcome.offsets, vec![9_990_000]);

    let saved = ProgressStore::new(&config.checkpoint_path)
        .load(&config.identity())
        .unwrap();
    assert_eq!(saved.start_from, 9_990_000);
}

#[cfg(target_os = "linux")]
#[test]
fn test_keep_going_reports_every_failure() {
    let dir = tempdir().unwrap();
    let config = config(
        dir.path(),
        &[
            "-c", "1", "-a", "212", "-o", "/dev/full", "--chunk-size", "1000", "-w", "2",
            "--keep-going",
        ],
    );
    seed(&config, vec![9_990_000]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failed.len(), 10);
    assert_eq!(outcome.offsets, vec![9_990_000]);
    assert!(config.checkpoint_path.exists());
}

#[test]
#[ignore = "writes 10,000,000 lines"]
fn test_full_single_prefix() {
    let dir = tempdir().unwrap();
    let config = merged_config(dir.path(), &["-c", "1", "-a", "212", "-w", "4"]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.chunks_written, 10);
    assert_eq!(outcome.numbers_written, 10_000_000);

    // 10M lines of 11 digits plus newline
    let size = fs::metadata(&config.outputs[0]).unwrap().len();
    assert_eq!(size, 10_000_000 * 12);
}

#[test]
#[ignore = "writes 20,000,000 lines"]
fn test_full_two_prefixes() {
    let dir = tempdir().unwrap();
    let config = merged_config(dir.path(), &["-c", "1", "-a", "212,646"]);

    let outcome = RunController::new(config.clone()).run().unwrap();
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.numbers_written, 20_000_000);

    let content = fs::read_to_string(&config.outputs[0]).unwrap();
    let unique: HashSet<&str> = content.lines().collect();
    assert_eq!(unique.len(), 20_000_000);
}
