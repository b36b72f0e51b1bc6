use super::*;
use tempfile::TempDir;

#[test]
fn default_config_is_valid() {
    let config = Config {
        llm: LlmConfig::default(),
        store: StoreConfig::default(),
        base_dir: PathBuf::new(),
    };
    assert!(config.validate().is_ok());
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("load should succeed");

    assert_eq!(config.llm, LlmConfig::default());
    assert_eq!(config.store, StoreConfig::default());
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        llm: LlmConfig {
            chat_model: "gpt-4o-mini".to_string(),
            batch_size: 8,
            ..LlmConfig::default()
        },
        store: StoreConfig {
            collection: "test-parts".to_string(),
        },
        base_dir: temp_dir.path().to_path_buf(),
    };

    config.save().expect("save should succeed");
    let reloaded = Config::load(temp_dir.path()).expect("load should succeed");

    assert_eq!(reloaded, config);
}

#[test]
fn load_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[llm]\nchat_model = \"gpt-4o\"\n",
    )
    .expect("should write config file");

    let config = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(config.llm.chat_model, "gpt-4o");
    assert_eq!(config.llm.batch_size, LlmConfig::default().batch_size);
    assert_eq!(config.store.collection, StoreConfig::default().collection);
}

#[test]
fn invalid_base_url_rejected() {
    let config = LlmConfig {
        base_url: "not-a-url".to_string(),
        ..LlmConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let config = LlmConfig {
        base_url: "ftp://example.com/v1".to_string(),
        ..LlmConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));
}

#[test]
fn empty_model_rejected() {
    let config = LlmConfig {
        chat_model: "  ".to_string(),
        ..LlmConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));
}

#[test]
fn batch_size_bounds() {
    let config = LlmConfig {
        batch_size: 0,
        ..LlmConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));

    let config = LlmConfig {
        batch_size: 1001,
        ..LlmConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(1001))
    ));
}

#[test]
fn embedding_dimension_bounds() {
    for dimension in [0, 63, 4097] {
        let config = LlmConfig {
            embedding_dimension: dimension,
            ..LlmConfig::default()
        };
        assert!(
            matches!(
                config.validate(),
                Err(ConfigError::InvalidEmbeddingDimension(_))
            ),
            "dimension {} should be rejected",
            dimension
        );
    }
}

#[test]
fn collection_name_rejects_path_characters() {
    for name in ["", "has space", "../escape", "semi;colon"] {
        let config = StoreConfig {
            collection: name.to_string(),
        };
        assert!(
            matches!(config.validate(), Err(ConfigError::InvalidCollection(_))),
            "collection {:?} should be rejected",
            name
        );
    }

    let config = StoreConfig {
        collection: "Appliance_Parts-2".to_string(),
    };
    assert!(config.validate().is_ok());
}

#[test]
fn endpoint_url_keeps_final_segment() {
    let config = LlmConfig::default();
    let url = config.endpoint_url().expect("url should parse");
    let joined = url.join("chat/completions").expect("join should succeed");
    assert_eq!(joined.as_str(), "https://api.openai.com/v1/chat/completions");
}
