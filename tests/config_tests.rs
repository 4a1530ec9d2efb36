use photo_vr::config::{Configuration, DepthConfig, ForegroundConfig, ModelMotion};
use std::io::Write;
use std::time::Duration;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.pipeline.grid_resolution, [32, 32]);
    assert!((cfg.pipeline.depth_scale - 0.5).abs() < f32::EPSILON);
    assert!(matches!(
        cfg.pipeline.foreground,
        ForegroundConfig::ChromaKey { green_ratio } if (green_ratio - 1.2).abs() < f32::EPSILON
    ));
    assert!(cfg.immersive.vr_supported);
    assert!(!cfg.immersive.ar_supported);
    assert_eq!(cfg.immersive.grant_delay, Duration::from_millis(300));
    assert_eq!(cfg.viewer.background_color, [0x1a, 0x1a, 0x2e]);
}

#[test]
fn parse_kebab_case_sections() {
    let yaml = r#"
pipeline:
  foreground:
    type: alpha-channel
    threshold: 10
  depth:
    type: vertical-gradient
  depth-scale: 0.8
  grid-resolution: [64, 48]
  enhance:
    contrast: 1.3
viewer:
  fov-degrees: 60
  zoom-step: 0.25
  motion: bounce
  model-scale: 1.5
  start-in-passthrough: true
immersive:
  ar-supported: true
  grant-delay: 1s 500ms
  device-session-limit: 2m
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();

    assert!(matches!(
        cfg.pipeline.foreground,
        ForegroundConfig::AlphaChannel { threshold: 10 }
    ));
    assert!(matches!(cfg.pipeline.depth, DepthConfig::VerticalGradient));
    assert_eq!(cfg.pipeline.grid_resolution, [64, 48]);
    let enhance = cfg.pipeline.enhance.unwrap();
    assert!((enhance.contrast - 1.3).abs() < f32::EPSILON);
    assert!((enhance.saturation - 1.2).abs() < f32::EPSILON);

    assert_eq!(cfg.viewer.motion, ModelMotion::Bounce);
    assert!(cfg.viewer.start_in_passthrough);
    assert!((cfg.viewer.fov_degrees - 60.0).abs() < f32::EPSILON);

    assert!(cfg.immersive.ar_supported);
    assert_eq!(cfg.immersive.grant_delay, Duration::from_millis(1500));
    assert_eq!(
        cfg.immersive.device_session_limit,
        Some(Duration::from_secs(120))
    );
}

#[test]
fn chroma_key_ratio_defaults_when_omitted() {
    let yaml = r#"
pipeline:
  foreground:
    type: chroma-key
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(matches!(
        cfg.pipeline.foreground,
        ForegroundConfig::ChromaKey { green_ratio } if (green_ratio - 1.2).abs() < f32::EPSILON
    ));
}

#[test]
fn options_carry_pipeline_values() {
    let yaml = r#"
pipeline:
  depth-scale: 0.25
  grid-resolution: [3, 7]
  plane-width: 4.0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let options = cfg.pipeline.options().unwrap();
    assert_eq!(options.grid.columns(), 3);
    assert_eq!(options.grid.rows(), 7);
    assert!((options.depth_scale.get() - 0.25).abs() < f32::EPSILON);
    assert!((options.mesh.plane_width - 4.0).abs() < f32::EPSILON);
}

#[test]
fn zero_grid_is_rejected() {
    let yaml = r#"
pipeline:
  grid-resolution: [0, 4]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn oversized_grid_is_rejected() {
    let yaml = r#"
pipeline:
  grid-resolution: [65536, 65535]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.clone().validated().unwrap_err();
    assert!(format!("{err:#}").contains("grid-resolution"));
    assert!(cfg.pipeline.options().is_err());

    let cfg: Configuration =
        serde_yaml::from_str("pipeline:\n  grid-resolution: [1024, 1024]\n").unwrap();
    assert!(cfg.validated().is_ok());
}

#[test]
fn input_dimension_beyond_texture_limit_is_rejected() {
    let cfg: Configuration =
        serde_yaml::from_str("pipeline:\n  max-input-dimension: 20000\n").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("max-input-dimension"));

    let cfg: Configuration =
        serde_yaml::from_str("pipeline:\n  max-input-dimension: null\n").unwrap();
    assert!(cfg.validated().is_ok());
}

#[test]
fn depth_scale_outside_unit_range_is_rejected() {
    let yaml = r#"
pipeline:
  depth-scale: 1.5
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("depth-scale"));
}

#[test]
fn camera_limits_are_validated() {
    let yaml = r#"
viewer:
  near: 2.0
  far: 1.0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());

    let yaml = r#"
viewer:
  model-scale: 3.0
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn motion_presets_parse() {
    for (name, motion) in [
        ("still", ModelMotion::Still),
        ("none", ModelMotion::Still),
        ("gentle", ModelMotion::Gentle),
        ("float", ModelMotion::Float),
    ] {
        let yaml = format!("viewer:\n  motion: {name}\n");
        let cfg: Configuration = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg.viewer.motion, motion, "{name}");
    }
}

#[test]
fn unknown_estimator_fails_to_parse() {
    let yaml = r#"
pipeline:
  depth:
    type: midas
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "viewer:\n  auto-rotate: false\n  near: 0.5").unwrap();
    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert!(!cfg.viewer.auto_rotate);
    assert!((cfg.viewer.near - 0.5).abs() < f32::EPSILON);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Configuration::from_yaml_file(dir.path().join("absent.yaml")).is_err());
}
