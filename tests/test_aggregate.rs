mod common;
use common::{constant_epochs, cycling_codes, oddball_recording, test_config};
use p3erp::aggregate::{find_epoch_files, GRAND_AVERAGE_STEM};
use p3erp::pipeline::process_recording;
use p3erp::{difference_wave, grand_average, load_epochs, save_epochs, Comparison, DropReason, PipelineConfig};

#[test]
fn grand_average_weights_every_epoch_equally() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig { output_dir: dir.path().to_path_buf(), ..PipelineConfig::variant_a() };

    // P1: 3 odd + 6 normal at 2 µV, P2: 1 odd + 2 normal at 10 µV.
    let p1 = constant_epochs(&[("odd", 1, 3), ("normal", 4, 6)], 2e-6);
    let p2 = constant_epochs(&[("odd", 1, 1), ("normal", 4, 2)], 10e-6);
    save_epochs(&p1, &cfg.epochs_path("1")).unwrap();
    save_epochs(&p2, &cfg.epochs_path("2")).unwrap();

    let grand = grand_average(&cfg).unwrap();
    assert_eq!(grand.sources.len(), 2);
    assert_eq!(grand.epochs.len(), 12);

    let odd = grand.evokeds.iter().find(|e| e.comment == "odd").unwrap();
    assert_eq!(odd.nave, 4);
    // (3·2 + 1·10) / 4 = 4 µV, not the per-participant mean of 6 µV.
    for &v in odd.data.iter() {
        approx::assert_abs_diff_eq!(v, 4e-6, epsilon = 1e-11);
    }
    let normal = grand.evokeds.iter().find(|e| e.comment == "normal").unwrap();
    assert_eq!(normal.nave, 8);
    for &v in normal.data.iter() {
        approx::assert_abs_diff_eq!(v, 4e-6, epsilon = 1e-11);
    }

    assert!(cfg.plot_path(GRAND_AVERAGE_STEM).exists());
    assert!(cfg.plot_path(&format!("{GRAND_AVERAGE_STEM} odd-normal")).exists());
}

#[test]
fn grand_difference_wave_is_subtraction() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig { output_dir: dir.path().to_path_buf(), ..PipelineConfig::variant_a() };
    let mut p = constant_epochs(&[("odd", 1, 2), ("normal", 4, 2)], 1e-6);
    for mut ep in p.data.outer_iter_mut().take(2) {
        ep.fill(7e-6);
    }
    save_epochs(&p, &cfg.epochs_path("1")).unwrap();

    let grand = grand_average(&cfg).unwrap();
    let odd = grand.evokeds.iter().find(|e| e.comment == "odd").unwrap();
    let normal = grand.evokeds.iter().find(|e| e.comment == "normal").unwrap();
    let diff = difference_wave(odd, normal).unwrap();
    for &v in diff.data.iter() {
        approx::assert_abs_diff_eq!(v, 6e-6, epsilon = 1e-11);
    }
}

#[test]
fn epoch_files_round_trip_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let mut set = constant_epochs(&[("odd/1", 11, 2), ("normal/1", 21, 3)], 0.0);
    for (i, v) in set.data.iter_mut().enumerate() {
        *v = (i as f32 * 0.37).sin() * 1e-5;
    }
    set.drop_log.push(Some(DropReason::TooBigPtp { channel: "Cz".into() }));
    set.drop_log.push(Some(DropReason::NoData));

    let path = dir.path().join("9-epo.safetensors");
    save_epochs(&set, &path).unwrap();
    let back = load_epochs(&path).unwrap();
    assert_eq!(back, set);
    assert_eq!(back.labels(), vec!["odd/1".to_string(), "normal/1".to_string()]);
}

#[test]
fn variant_b_grand_average_per_sub_condition() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig { output_dir: dir.path().to_path_buf(), ..PipelineConfig::variant_b() };
    let conditions: Vec<(String, i32, usize)> = (1..=4)
        .flat_map(|k| [(format!("odd/{k}"), 10 + k, 1), (format!("normal/{k}"), 20 + k, 2)])
        .collect();
    let conds: Vec<(&str, i32, usize)> = conditions.iter().map(|(l, c, n)| (l.as_str(), *c, *n)).collect();
    save_epochs(&constant_epochs(&conds, 3e-6), &cfg.epochs_path("1")).unwrap();
    save_epochs(&constant_epochs(&conds, 5e-6), &cfg.epochs_path("2")).unwrap();

    let grand = grand_average(&cfg).unwrap();
    assert_eq!(grand.evokeds.len(), 8);
    assert_eq!(grand.plots.len(), 8);
    let odd3 = grand.evokeds.iter().find(|e| e.comment == "odd/3").unwrap();
    assert_eq!(odd3.nave, 2);
    assert!(cfg.plot_path("Grand Average odd3 vs normal3").exists());

    // Tag selection pools all sub-conditions.
    let all_odd = grand.epochs.average_condition("odd").unwrap();
    assert_eq!(all_odd.nave, 8);
    approx::assert_abs_diff_eq!(all_odd.data[[0, 0]], 4e-6, epsilon = 1e-11);
}

#[test]
fn pipeline_output_feeds_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.comparisons = vec![Comparison::new("odd", "normal", true)];
    process_recording("1", oddball_recording(&cycling_codes(12), &[]), &cfg).unwrap();
    process_recording("2", oddball_recording(&cycling_codes(16), &[3]), &cfg).unwrap();
    // Excluded: 4 of 12 dropped.
    process_recording("3", oddball_recording(&cycling_codes(12), &[0, 1, 2, 3]), &cfg).unwrap();

    let files = find_epoch_files(&cfg.output_dir).unwrap();
    assert_eq!(files.len(), 2);
    let grand = grand_average(&cfg).unwrap();
    assert_eq!(grand.epochs.len(), 12 + 15);
    let counts = grand.epochs.counts();
    assert_eq!(counts[0], ("odd".to_string(), 7));
    assert_eq!(counts[3], ("normal".to_string(), 6));
}
