use super::*;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "customizer_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn defaults_are_valid() {
    let cfg = CustomizerConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.canvas, Canvas::DEFAULT);
    assert_eq!(cfg.ledger_page_size, 250);
    assert_eq!(cfg.max_conflict_attempts, 100);
    assert_eq!(cfg.grace_days, 7);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let path = temp_path("config_partial.json");
    std::fs::write(&path, r#"{ "grace_days": 3, "canvas": { "width": 300, "height": 200 } }"#)
        .unwrap();

    let cfg = CustomizerConfig::from_json_path(&path).unwrap();
    assert_eq!(cfg.grace_days, 3);
    assert_eq!(cfg.canvas.width, 300);
    assert_eq!(cfg.root_prefix, "customizer");

    std::fs::remove_file(&path).ok();
}

#[test]
fn invalid_values_are_rejected() {
    let cfg = CustomizerConfig {
        ledger_page_size: 0,
        ..CustomizerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = CustomizerConfig {
        root_prefix: "/".to_string(),
        ..CustomizerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let path = temp_path("config_unknown.json");
    std::fs::write(&path, r#"{ "gracedays": 3 }"#).unwrap();
    assert!(matches!(
        CustomizerConfig::from_json_path(&path),
        Err(CustomizerError::Serde(_))
    ));
    std::fs::remove_file(&path).ok();
}
