// tests/config_loading.rs

use std::io::Write;

use opqueue::OperationQueue;
use opqueue::config::{
    EngineConfig, LogLevel, LoggingSection, QueueSection, load_from_path, parse_str,
};
use opqueue::errors::OpQueueError;
use opqueue::logging::resolve_level;
use tempfile::NamedTempFile;

#[test]
fn test_full_config_file_is_loaded() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[logging]
level = "debug"

[queue]
name = "uploads"
"#
    )
    .unwrap();

    let config = load_from_path(file.path()).unwrap();

    assert_eq!(
        config,
        EngineConfig {
            logging: LoggingSection {
                level: Some(LogLevel::Debug),
            },
            queue: QueueSection {
                name: Some("uploads".to_string()),
            },
        }
    );
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    assert_eq!(parse_str("").unwrap(), EngineConfig::default());

    let config = parse_str("[queue]\nname = \"only-queue\"\n").unwrap();
    assert_eq!(config.logging.level, None);
    assert_eq!(config.queue.name.as_deref(), Some("only-queue"));
}

#[test]
fn test_unknown_key_is_rejected() {
    let result = parse_str(
        r#"
[queue]
name = "q"
workers = 4
"#,
    );

    match result {
        Err(OpQueueError::Toml(err)) => assert!(err.to_string().contains("workers")),
        Err(e) => panic!("Expected Toml error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_invalid_level_is_rejected() {
    let result = parse_str("[logging]\nlevel = \"loud\"\n");
    assert!(matches!(result, Err(OpQueueError::Toml(_))));
}

#[test]
fn test_blank_queue_name_returns_config_error() {
    for name in ["", "   "] {
        let result = parse_str(&format!("[queue]\nname = \"{name}\"\n"));

        match result {
            Err(OpQueueError::Config(msg)) => assert!(msg.contains("[queue].name")),
            Err(e) => panic!("Expected Config error, got: {:?}", e),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    }
}

#[test]
fn test_missing_file_returns_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(OpQueueError::Io(_))));
}

#[test]
fn test_log_level_parsing() {
    assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
    assert_eq!(" TRACE ".parse::<LogLevel>(), Ok(LogLevel::Trace));
    let err = "verbose".parse::<LogLevel>().unwrap_err();
    assert!(err.contains("verbose"));
}

#[test]
fn test_log_level_priority() {
    assert_eq!(
        resolve_level(Some(LogLevel::Error), Some("trace")),
        tracing::Level::ERROR
    );
    assert_eq!(resolve_level(None, Some("debug")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[test]
fn test_queue_name_from_config() {
    let named = OperationQueue::from_config(&QueueSection {
        name: Some("uploads".to_string()),
    });
    assert_eq!(named.name(), "uploads");

    let first = OperationQueue::from_config(&QueueSection::default());
    let second = OperationQueue::from_config(&QueueSection::default());
    assert_ne!(first.name(), second.name());
}
