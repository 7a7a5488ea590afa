//! End-to-end band math scenarios.

use bandmath::prelude::*;

fn f64_options() -> RunOptions {
    RunOptions::new().with_pixel_type(PixelType::F64)
}

#[test]
fn test_difference_of_two_images() {
    // row i, col j
    let sum = VectorImage::from_fn(4, 4, 1, |j, i, _| (i + j) as f64);
    let product = VectorImage::from_fn(4, 4, 1, |j, i, _| (i * j) as f64);

    let mut filter = BandMathFilter::new().with_options(f64_options());
    filter.declare_input(&sum, None).unwrap();
    filter.declare_input(&product, None).unwrap();
    filter.set_expression("im1b1 - im2b1");

    let result = filter.run_largest().unwrap();
    let output = &result.outputs[0];
    for i in 0..4u32 {
        for j in 0..4u32 {
            let expected = (i + j) as f64 - (i * j) as f64;
            assert_eq!(output.get(j, i, 0), expected, "pixel ({}, {})", i, j);
        }
    }
    assert_eq!(result.report.pixels, 16);
    assert_eq!((result.report.underflow, result.report.overflow), (0, 0));
}

#[test]
fn test_global_mean_is_broadcast() {
    let image = VectorImage::from_fn(10, 10, 1, |x, y, _| (y * 10 + x) as f64);

    let mut filter = BandMathFilter::new().with_options(f64_options().with_threads(3).with_stream_lines(4));
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("im1b1Mean");

    let result = filter.run_largest().unwrap();
    assert!(result.outputs[0].data().iter().all(|&v| v == 49.5));
}

#[test]
fn test_global_statistics_cover_whole_image() {
    let image = VectorImage::from_fn(10, 10, 1, |x, y, _| (y * 10 + x) as f64);

    let mut filter = BandMathFilter::new().with_options(f64_options());
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("cat(im1b1Min, im1b1Max, im1b1Sum)");

    // a small output region still sees statistics of the full extent
    let result = filter.run(Region::new(2, 2, 2, 2)).unwrap();
    assert_eq!(result.outputs[0].pixel(1, 1), &[0.0, 99.0, 4950.0]);
}

#[test]
fn test_neighborhood_larger_than_image_fails() {
    let image = VectorImage::from_fn(3, 3, 1, |x, y, _| (x + y) as f64);

    let mut filter = BandMathFilter::new();
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("mean(im1b1N5x5)");

    let err = filter.run_largest().unwrap_err();
    match err {
        BandMathError::RegionNegotiation { input, name, source } => {
            assert_eq!(input, 0);
            assert_eq!(name, "im1");
            assert!(matches!(source, RegionError::OutsideAvailableExtent { window: (5, 5), .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_overflow_counting() {
    let image = VectorImage::new(5, 4, 1);

    let mut filter = BandMathFilter::new().with_options(RunOptions::new().with_pixel_type(PixelType::U8).with_threads(2));
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("1e9");

    let result = filter.run_largest().unwrap();
    assert_eq!(result.report.overflow, 20);
    assert_eq!(result.report.underflow, 0);
    assert!(result.outputs[0].data().iter().all(|&v| v == 255.0));
}

#[test]
fn test_underflow_counting() {
    let image = VectorImage::from_fn(4, 1, 1, |x, _, _| x as f64);

    let mut filter = BandMathFilter::new().with_options(RunOptions::new().with_pixel_type(PixelType::I8));
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("im1b1 * -100");

    let result = filter.run_largest().unwrap();
    assert_eq!(result.outputs[0].data(), &[0.0, -100.0, -128.0, -128.0]);
    assert_eq!((result.report.underflow, result.report.overflow), (2, 0));
}

#[test]
fn test_runs_are_idempotent() {
    let a = VectorImage::from_fn(9, 7, 3, |x, y, b| ((x * 31 + y * 17 + b as u32 * 7) % 23) as f64 * 0.37);

    let run = || {
        let mut filter = BandMathFilter::new().with_options(f64_options().with_threads(4).with_stream_lines(3));
        filter.declare_input(&a, None).unwrap();
        filter.declare_constant("k", 1.5).unwrap();
        filter.set_expression("median(im1b2N3x3) * k + im1b3Var");
        filter.set_expression("vsqrt(im1) + idxX");
        filter.run_largest().unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.outputs, second.outputs);

    let bits = |image: &VectorImage| image.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    for (x, y) in first.outputs.iter().zip(&second.outputs) {
        assert_eq!(bits(x), bits(y));
    }
}

#[test]
fn test_same_filter_twice() {
    let image = VectorImage::from_fn(5, 5, 1, |x, y, _| (x * y) as f64);
    let mut filter = BandMathFilter::new().with_options(f64_options());
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("max(im1b1, 3) + im1b1Max");

    let first = filter.run_largest().unwrap();
    let second = filter.run_largest().unwrap();
    assert_eq!(first.outputs, second.outputs);
}

#[test]
fn test_data_dependent_shape_rejected_at_preparation() {
    let image = VectorImage::from_fn(4, 4, 3, |x, _, _| x as f64);

    let mut filter = BandMathFilter::new();
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("im1b1 > 1 ? im1 : bands(im1, {1, 2})");

    let err = filter.run_largest().unwrap_err();
    match err {
        BandMathError::Evaluation { source, .. } => {
            assert!(matches!(source, ExpressionError::InconsistentShape { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_vector_width_fixed_by_trial() {
    let image = VectorImage::from_fn(4, 4, 3, |x, y, b| (x + y + b as u32) as f64);

    let mut filter = BandMathFilter::new().with_options(f64_options());
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("im1b1 > 1 ? im1 : im1 * 0");

    let result = filter.run_largest().unwrap();
    assert_eq!(result.outputs[0].bands(), 3);
    assert_eq!(result.outputs[0].pixel(0, 0), &[0.0, 0.0, 0.0]);
    assert_eq!(result.outputs[0].pixel(2, 1), &[3.0, 4.0, 5.0]);
}

#[test]
fn test_unsupported_results() {
    let image = VectorImage::new(2, 2, 1);

    for (expression, check) in [
        ("im1b1 == 0", "boolean"),
        ("cmplx(1, 2)", "complex"),
    ] {
        let mut filter = BandMathFilter::new();
        filter.declare_input(&image, None).unwrap();
        filter.set_expression(expression);
        match filter.run_largest().unwrap_err() {
            BandMathError::UnsupportedResultType { type_name, .. } => assert_eq!(type_name, check),
            other => panic!("unexpected {:?}", other),
        }
    }

    let mut filter = BandMathFilter::new();
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("{1, 2; 3, 4}");
    assert!(matches!(
        filter.run_largest().unwrap_err(),
        BandMathError::MatrixResult { rows: 2, cols: 2, .. }
    ));
}

#[test]
fn test_band_index_out_of_range() {
    let image = VectorImage::new(2, 2, 2);
    let mut filter = BandMathFilter::new();
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("bands(im1, {1, 3})");
    match filter.run_largest().unwrap_err() {
        BandMathError::Evaluation { source, .. } => {
            assert_eq!(source, ExpressionError::BandOutOfRange { band: 3, bands: 2 });
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_context_file_round_trip() {
    let image = VectorImage::from_fn(6, 5, 1, |x, y, _| (x * 2 + y) as f64);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.txt");

    let mut filter = BandMathFilter::new().with_options(f64_options());
    filter.declare_input(&image, None).unwrap();
    filter.declare_constant("offset", 7).unwrap();
    filter.declare_constant("gain", 0.125).unwrap();
    filter.declare_matrix("weights", 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    filter.set_expression("im1b1 * gain + offset");
    filter.set_expression("{1, 1} * weights + im1b1");
    filter.export_context(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "#I offset 7\n#F gain 0.125\n#M weights { 1 , 2 , 3 ; 4 , 5 , 6 }\n\
         #E im1b1 * gain + offset\n#E {1, 1} * weights + im1b1\n"
    );

    let mut restored = BandMathFilter::new().with_options(f64_options());
    restored.declare_input(&image, None).unwrap();
    restored.import_context(&path).unwrap();

    assert_eq!(restored.expressions(), filter.expressions());
    assert_eq!(
        restored.registry().constants().collect::<Vec<_>>(),
        filter.registry().constants().collect::<Vec<_>>()
    );
    assert_eq!(
        restored.registry().matrices().collect::<Vec<_>>(),
        filter.registry().matrices().collect::<Vec<_>>()
    );

    let expected = filter.run_largest().unwrap();
    let actual = restored.run_largest().unwrap();
    assert_eq!(actual.outputs, expected.outputs);
    assert_eq!(expected.outputs[1].pixel(0, 0), &[5.0, 7.0, 9.0]);
}

#[test]
fn test_import_missing_file() {
    let mut filter = BandMathFilter::new();
    let err = filter.import_context("/nonexistent/session.txt").unwrap_err();
    assert!(matches!(err, BandMathError::Context(ContextError::Io { .. })));
}

#[test]
fn test_import_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut filter = BandMathFilter::new();
    let err = filter.import_context(file.path()).unwrap_err();
    assert!(matches!(err, BandMathError::Context(ContextError::NothingToImport { .. })));
}

#[test]
fn test_progress_reports_every_region() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let regions = Arc::new(AtomicUsize::new(0));
    let seen = regions.clone();
    let options = f64_options().with_stream_lines(2).with_progress(move |update| {
        if let ProgressUpdate::RegionCompleted { .. } = update {
            seen.fetch_add(1, Ordering::Relaxed);
        }
    });

    let image = VectorImage::new(3, 7, 1);
    let mut filter = BandMathFilter::new().with_options(options);
    filter.declare_input(&image, None).unwrap();
    filter.set_expression("idxY");
    let result = filter.run_largest().unwrap();

    assert_eq!(result.report.regions, 4);
    assert_eq!(regions.load(Ordering::Relaxed), 4);
    assert_eq!(result.outputs[0].pixel(2, 6), &[6.0]);
}
