mod common;
use common::{cycling_codes, oddball_recording, test_config};
use p3erp::io::save_recording;
use p3erp::pipeline::{process_recording, run_participant, run_participants};
use p3erp::{load_epochs, ExclusionPolicy, ParticipantOutcome, PipelineConfig};

const N_EVENTS: usize = 20;

#[test]
fn thirty_percent_bad_epochs_excludes_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let bad = [0, 3, 6, 9, 12, 15];
    let rec = oddball_recording(&cycling_codes(N_EVENTS), &bad);

    let outcome = process_recording("1", rec, &cfg).unwrap();
    assert!(outcome.is_excluded());
    approx::assert_abs_diff_eq!(outcome.drop_rate(), 30.0, epsilon = 1e-4);
    assert!(outcome.output().is_none());
    assert!(!cfg.epochs_path("1").exists());
    assert!(!cfg.plot_path("1").exists());
}

#[test]
fn preset_ica_keeps_artifacts_for_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig { ica: PipelineConfig::variant_a().ica, ..test_config(dir.path()) };
    assert!(cfg.ica.as_ref().is_some_and(|ica| ica.exclude.is_empty() && ica.kurtosis_threshold.is_none()));
    let rec = oddball_recording(&cycling_codes(N_EVENTS), &[0, 3, 6, 9, 12, 15]);

    let outcome = process_recording("2", rec, &cfg).unwrap();
    assert!(outcome.is_excluded());
    approx::assert_abs_diff_eq!(outcome.drop_rate(), 30.0, epsilon = 1e-4);
    assert!(!cfg.epochs_path("2").exists());
}

#[test]
fn accepted_participant_persists_one_file_and_one_evoked_per_condition() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let rec = oddball_recording(&cycling_codes(N_EVENTS), &[2, 7]);

    let outcome = process_recording("4", rec, &cfg).unwrap();
    let ParticipantOutcome::Included { n_epochs, drop_rate, output } = outcome else {
        panic!("participant should be included");
    };
    assert_eq!(n_epochs, 18);
    approx::assert_abs_diff_eq!(drop_rate, 10.0, epsilon = 1e-4);

    let files: Vec<_> = std::fs::read_dir(&cfg.output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.ends_with("-epo.safetensors"))
        .collect();
    assert_eq!(files, vec!["4-epo.safetensors".to_string()]);

    let labels: Vec<_> = output.evokeds.iter().map(|e| e.comment.as_str()).collect();
    assert_eq!(labels, vec!["odd", "response", "dummy", "normal"]);
    assert_eq!(output.plots, vec![cfg.plot_path("4")]);
    assert!(cfg.plot_path("4").exists());

    let saved = load_epochs(&output.epochs_path).unwrap();
    assert_eq!(saved.len(), 18);
    assert_eq!(saved.drop_log.len(), N_EVENTS);
    assert_eq!(saved.ch_names.len(), 6);
}

#[test]
fn exclusion_can_be_logged_only() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        exclusion: ExclusionPolicy { max_drop_pct: 25.0, skip_persistence: false },
        ..test_config(dir.path())
    };
    let rec = oddball_recording(&cycling_codes(N_EVENTS), &[0, 1, 2, 3, 4, 5, 6]);

    let outcome = process_recording("2", rec, &cfg).unwrap();
    assert!(outcome.is_excluded());
    let output = outcome.output().expect("persistence should proceed");
    assert!(output.epochs_path.exists());
    assert_eq!(load_epochs(&output.epochs_path).unwrap().len(), 13);
}

#[test]
fn drop_rate_at_threshold_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let rec = oddball_recording(&cycling_codes(N_EVENTS), &[0, 4, 8, 12, 16]);
    let outcome = process_recording("3", rec, &cfg).unwrap();
    assert!(!outcome.is_excluded());
    approx::assert_abs_diff_eq!(outcome.drop_rate(), 25.0, epsilon = 1e-4);
}

#[test]
fn participants_run_from_disk_in_order() {
    let dir = tempfile::tempdir().unwrap();
    save_recording(&oddball_recording(&cycling_codes(N_EVENTS), &[]), &dir.path().join("1.safetensors")).unwrap();
    save_recording(
        &oddball_recording(&cycling_codes(N_EVENTS), &[1, 2, 3, 5, 8, 13]),
        &dir.path().join("2.safetensors"),
    )
    .unwrap();
    let cfg = PipelineConfig { participants: vec!["1".into(), "2".into()], ..test_config(dir.path()) };

    let outcomes = run_participants(&cfg).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "1");
    assert!(!outcomes[0].1.is_excluded());
    assert!(outcomes[1].1.is_excluded());
    assert!(cfg.epochs_path("1").exists());
    assert!(!cfg.epochs_path("2").exists());
}

#[test]
fn missing_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    assert!(run_participant("99", &cfg).is_err());
}

#[test]
fn missing_drop_channel_follows_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.drop_channels.push("ExG 1".into());
    let rec = oddball_recording(&cycling_codes(8), &[]);
    assert!(process_recording("5", rec.clone(), &cfg).is_err());

    cfg.on_missing = p3erp::OnMissing::Ignore;
    assert!(!process_recording("5", rec, &cfg).unwrap().is_excluded());
}

#[test]
fn variant_b_with_ica_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        input_template: format!("{}/{{id}}.safetensors", dir.path().display()),
        output_dir: dir.path().join("out"),
        drop_channels: vec!["TRIGGER".into()],
        ..PipelineConfig::variant_b()
    };
    let codes: Vec<i32> = (0..24).map(|k| if k % 2 == 0 { 11 + (k / 2 % 4) } else { 21 + (k / 2 % 4) }).collect();
    let rec = oddball_recording(&codes, &[]);

    let outcome = process_recording("7", rec, &cfg).unwrap();
    let output = outcome.output().unwrap();
    let saved = load_epochs(&output.epochs_path).unwrap();
    // 256 Hz: round(-0.2·256) = -51 … round(0.5·256) = 128.
    assert_eq!(saved.n_times(), 180);
    assert_eq!(saved.len(), 24);
    assert_eq!(output.evokeds.len(), 8);
    // Four comparisons, each with a difference wave.
    assert_eq!(output.plots.len(), 8);
}
