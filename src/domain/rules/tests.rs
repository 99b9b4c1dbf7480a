// Unit tests for business rules

use std::path::PathBuf;

use super::*;

fn create_test_media_info() -> MediaInfo {
    MediaInfo {
        path: PathBuf::from("source.mp4"),
        container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        duration: TimeSpec::from_seconds(30.0),
        file_size: 1_000_000,
        bit_rate: Some(1_000_000),
        video: Some(VideoStreamInfo::new(0, "h264", 1920, 1080, 30.0)),
        audio_streams: vec![AudioStreamInfo::new(1, "aac", 48000, 2)],
    }
}

fn trim(start: f64, end: f64) -> EditRequest {
    EditRequest::trim(
        "source.mp4",
        "out.mp4",
        TimeSpec::from_seconds(start),
        TimeSpec::from_seconds(end),
    )
}

fn keyframes(times: &[f64]) -> Option<&[f64]> {
    Some(times)
}

fn validated_trim(start: f64, end: f64) -> ValidatedRequest {
    EditRequestValidator::default()
        .validate(trim(start, end), &create_test_media_info())
        .unwrap()
}

#[test]
fn test_trim_inverted_or_empty_range_is_range_error() {
    let validator = EditRequestValidator::default();
    let media = create_test_media_info();

    for (start, end) in [(10.0, 5.0), (5.0, 5.0), (29.0, 0.5)] {
        let err = validator.validate(trim(start, end), &media).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RangeError, "{} -> {}", start, end);
        assert!(validator.check_shape(&trim(start, end)).is_err());
    }
}

#[test]
fn test_trim_negative_start_and_past_end_are_range_errors() {
    let validator = EditRequestValidator::default();
    let media = create_test_media_info();

    let err = validator.validate(trim(-1.0, 5.0), &media).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeError);

    let err = validator.validate(trim(5.0, 31.0), &media).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeError);

    // Past-the-end is only detectable once the media is known
    assert!(validator.check_shape(&trim(5.0, 31.0)).is_ok());
    assert!(validator.validate(trim(5.0, 30.0), &media).is_ok());
}

#[test]
fn test_export_non_positive_parameters_are_parameter_errors() {
    let validator = EditRequestValidator::default();
    let media = create_test_media_info();

    let cases = [
        (0, 1920, 60.0),
        (1080, -2, 60.0),
        (1080, 1920, 0.0),
        (1080, 1920, -30.0),
        (1080, 1920, f64::NAN),
    ];
    for (width, height, fps) in cases {
        let request = EditRequest::export("source.mp4", "out.mp4", width, height, fps);
        let err = validator.validate(request, &media).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParameterError, "{}x{}@{}", width, height, fps);
    }
}

#[test]
fn test_export_limits_are_enforced() {
    let validator = EditRequestValidator::new(ValidationLimits {
        max_width: 1920,
        max_height: 1920,
        max_fps: 60.0,
    });
    let media = create_test_media_info();

    let too_wide = EditRequest::export("source.mp4", "out.mp4", 3840, 1080, 30.0);
    assert!(validator.validate(too_wide, &media).is_err());

    let too_fast = EditRequest::export("source.mp4", "out.mp4", 1080, 1920, 120.0);
    assert!(validator.validate(too_fast, &media).is_err());

    let odd = EditRequest::export("source.mp4", "out.mp4", 1081, 1920, 30.0);
    assert!(validator.validate(odd, &media).is_err());

    let ok = EditRequest::export("source.mp4", "out.mp4", 1080, 1920, 60.0);
    let validated = validator.validate(ok, &media).unwrap();
    assert_eq!(
        validated.operation(),
        &ValidatedOperation::Export(ExportTarget {
            width: 1080,
            height: 1920,
            fps: 60.0
        })
    );
}

#[test]
fn test_export_requires_video_stream() {
    let mut media = create_test_media_info();
    media.video = None;
    let request = EditRequest::export("source.mp4", "out.mp4", 1080, 1920, 60.0);
    let err = EditRequestValidator::default()
        .validate(request, &media)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterError);
}

#[test]
fn test_output_path_rules() {
    let validator = EditRequestValidator::default();

    let same = EditRequest::trim(
        "clip.mp4",
        "clip.mp4",
        TimeSpec::from_seconds(0.0),
        TimeSpec::from_seconds(1.0),
    );
    assert!(matches!(
        validator.check_shape(&same),
        Err(ValidationError::Parameter(_))
    ));

    let no_extension = EditRequest::trim(
        "clip.mp4",
        "clip_trimmed",
        TimeSpec::from_seconds(0.0),
        TimeSpec::from_seconds(1.0),
    );
    assert!(validator.check_shape(&no_extension).is_err());
}

#[test]
fn test_auto_trim_prefers_stream_copy_on_keyframe() {
    let request = validated_trim(5.0, 10.0);
    let builder = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast);
    assert!(builder.needs_keyframes(&request));

    let plan = builder.build(&request, keyframes(&[0.0, 2.0, 4.0, 5.0, 6.0])).unwrap();
    assert_eq!(plan.strategy(), PlanStrategy::StreamCopy);
    assert_eq!(plan.stage_names(), vec!["demux", "stream_copy", "mux"]);
    assert_eq!(plan.expected_duration().seconds, 5.0);
    assert!(plan.encoder().is_none());
}

#[test]
fn test_auto_trim_falls_back_when_start_misses_keyframe() {
    let request = validated_trim(5.5, 10.0);
    let builder = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast);

    let plan = builder.build(&request, keyframes(&[0.0, 4.0, 8.0])).unwrap();
    assert_eq!(plan.strategy(), PlanStrategy::Reencode);
    assert!(plan.decision().contains("not on a keyframe"));
    assert_eq!(plan.stage_names(), vec!["demux", "decode", "encode", "mux"]);

    let unknown = builder.build(&request, None).unwrap();
    assert_eq!(unknown.strategy(), PlanStrategy::Reencode);
}

#[test]
fn test_auto_trim_from_zero_needs_no_keyframes() {
    let request = validated_trim(0.0, 3.0);
    let builder = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast);
    assert!(!builder.needs_keyframes(&request));
    let plan = builder.build(&request, None).unwrap();
    assert!(plan.is_stream_copy());
}

#[test]
fn test_auto_trim_falls_back_for_uncopyable_codec() {
    let mut media = create_test_media_info();
    media.video = Some(VideoStreamInfo::new(0, "prores", 1920, 1080, 25.0));
    let request = EditRequestValidator::default()
        .validate(trim(0.0, 3.0), &media)
        .unwrap();

    let plan = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast)
        .build(&request, None)
        .unwrap();
    assert_eq!(plan.strategy(), PlanStrategy::Reencode);
    assert!(plan.decision().contains("prores"));
}

#[test]
fn test_forced_copy_reports_unsupported() {
    let request = validated_trim(5.5, 10.0);
    let err = PlanBuilder::new(TrimStrategy::Copy, EncoderTier::Fast)
        .build(&request, keyframes(&[0.0, 4.0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_forced_reencode_skips_keyframes() {
    let request = validated_trim(5.0, 10.0);
    let builder = PlanBuilder::new(TrimStrategy::Reencode, EncoderTier::Quality);
    assert!(!builder.needs_keyframes(&request));
    let plan = builder.build(&request, None).unwrap();
    assert_eq!(plan.strategy(), PlanStrategy::Reencode);
    assert_eq!(plan.encoder().unwrap().preset, "slow");
}

#[test]
fn test_export_plan_goes_through_filter_and_encode() {
    let media = create_test_media_info();
    let request = EditRequestValidator::default()
        .validate(
            EditRequest::export("source.mp4", "out.mp4", 1080, 1920, 60.0),
            &media,
        )
        .unwrap();

    let plan = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast)
        .build(&request, None)
        .unwrap();
    assert_eq!(plan.kind(), EditKind::Export);
    assert_eq!(
        plan.stage_names(),
        vec!["demux", "decode", "filter", "encode", "mux"]
    );
    let filter = plan.filter().unwrap();
    assert_eq!(filter.scale, Some((1080, 1920)));
    assert_eq!(filter.fps, Some(60.0));
    assert_eq!(plan.encoder().unwrap().preset, "ultrafast");
    assert_eq!(plan.expected_duration().seconds, 30.0);
    assert!(plan.window().is_none());
}

#[test]
fn test_trim_plan_takes_paths_and_window_from_request() {
    let plan = PlanBuilder::new(TrimStrategy::Reencode, EncoderTier::Fast)
        .build(&validated_trim(5.0, 10.0), None)
        .unwrap();

    assert_eq!(plan.kind(), EditKind::Trim);
    assert_eq!(plan.source(), std::path::Path::new("source.mp4"));
    assert_eq!(plan.output(), std::path::Path::new("out.mp4"));
    let window = plan.window().unwrap();
    assert_eq!(window.start.seconds, 5.0);
    assert_eq!(window.end.seconds, 10.0);
    assert_eq!(plan.expected_duration().seconds, 5.0);
}

#[test]
fn test_identical_requests_build_identical_plans() {
    let builder = PlanBuilder::new(TrimStrategy::Auto, EncoderTier::Fast);
    let first = builder.build(&validated_trim(5.0, 10.0), keyframes(&[5.0])).unwrap();
    let second = builder.build(&validated_trim(5.0, 10.0), keyframes(&[5.0])).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_keyframe_alignment() {
    assert!(is_keyframe_aligned(&[0.0, 2.0, 4.0], 4.01, 0.02));
    assert!(!is_keyframe_aligned(&[0.0, 2.0, 4.0], 3.5, 0.02));
    assert!(!is_keyframe_aligned(&[], 1.0, 0.5));
}

#[test]
fn test_output_validator_checks_trim_duration() {
    let request = validated_trim(5.0, 10.0);
    let expectation = OutputExpectation::for_request(&request);

    let mut produced = create_test_media_info();
    produced.duration = TimeSpec::from_seconds(5.02);
    let result = OutputValidator::check(&expectation, &produced);
    assert!(result.overall_valid);
    assert_eq!(result.duration_difference_ms, Some(20));

    produced.duration = TimeSpec::from_seconds(6.0);
    assert!(!OutputValidator::check(&expectation, &produced).duration_valid);
}

#[test]
fn test_output_validator_checks_export_geometry() {
    let media = create_test_media_info();
    let request = EditRequestValidator::default()
        .validate(
            EditRequest::export("source.mp4", "out.mp4", 1080, 1920, 60.0),
            &media,
        )
        .unwrap();
    let expectation = OutputExpectation::for_request(&request);

    let mut produced = media.clone();
    produced.video = Some(VideoStreamInfo::new(0, "h264", 1080, 1920, 60.0));
    assert!(OutputValidator::check(&expectation, &produced).overall_valid);

    produced.video = Some(VideoStreamInfo::new(0, "h264", 1920, 1080, 60.0));
    let result = OutputValidator::check(&expectation, &produced);
    assert!(!result.dimensions_valid);
    assert!(result.fps_valid);
}
