//! Tests for PipelineConfig::load - config file location and env overrides.

mod support;

use std::fs;
use std::path::PathBuf;

use hstlc::config::{ConfigError, PipelineConfig};

fn write_config(dir: &std::path::Path) -> String {
    let path = dir.join("hstlc.toml");
    fs::write(
        &path,
        "[repository]\ntype = \"local\"\n\n[pipeline]\ningest_dir = \"/data/ingest\"\nnum_workers = 3\ncomposite_step = 10.0\n",
    )
    .unwrap();
    path.display().to_string()
}

#[test]
fn test_load_reads_file_named_by_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    support::with_scoped_env(
        &[("HSTLC_CONFIG", Some(path.as_str())), ("HSTLC_NUM_WORKERS", None)],
        || {
            let config = PipelineConfig::load().unwrap();
            assert_eq!(config.ingest_dir, PathBuf::from("/data/ingest"));
            assert_eq!(config.num_workers, 3);
            assert_eq!(config.composite_step().value(), 10.0);
            assert_eq!(config.individual_step, 2.0);
        },
    );
}

#[test]
fn test_num_workers_env_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    support::with_scoped_env(
        &[("HSTLC_CONFIG", Some(path.as_str())), ("HSTLC_NUM_WORKERS", Some("7"))],
        || assert_eq!(PipelineConfig::load().unwrap().num_workers, 7),
    );
}

#[test]
fn test_invalid_num_workers_env_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path());

    for raw in ["zero", "0"] {
        support::with_scoped_env(
            &[("HSTLC_CONFIG", Some(path.as_str())), ("HSTLC_NUM_WORKERS", Some(raw))],
            || {
                let err = PipelineConfig::load().unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { key: "num_workers", .. }));
            },
        );
    }
}

#[test]
fn test_unparsable_config_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hstlc.toml");
    fs::write(&path, "[pipeline\nnum_workers = 2\n").unwrap();
    let path = path.display().to_string();

    support::with_scoped_env(&[("HSTLC_CONFIG", Some(path.as_str()))], || {
        assert!(matches!(PipelineConfig::load(), Err(ConfigError::Parse { .. })));
    });
}
