//! Configuration store and session-level locking

use hemsim_core::config::{
    ConfigError, ConfigFile, ConfigStore, ConfigValue, RecordMode, INPUT_KEYS, SETTING_KEYS,
};
use hemsim_core::{RunParams, Session, SessionError};

#[test]
fn test_defaults() {
    let config = ConfigStore::default();
    let settings = config.run_settings();
    assert_eq!(settings.population_size, 1000);
    assert_eq!(settings.horizon_years, 20.0);
    assert_eq!(settings.seed, 12345);
    assert_eq!(settings.record_mode, RecordMode::All);
    assert_eq!(settings.agent_capacity, 100_000);
    assert_eq!(settings.event_capacity, 5_000_000);
    assert_eq!(settings.max_events_per_agent, 10_000);

    let inputs = config.model_inputs();
    assert_eq!(inputs.baseline_mean, vec![60.0, 1.0, 27.0]);
    assert_eq!(inputs.hospital_capacity, 50);
    assert!((inputs.hospital_stay_years - 7.0 / 365.0).abs() < 1e-15);
}

#[test]
fn test_every_key_listed() {
    let config = ConfigStore::default();
    for spec in INPUT_KEYS {
        assert!(config.inputs().contains_key(spec.name), "{}", spec.name);
    }
    for spec in SETTING_KEYS {
        assert!(config.settings().contains_key(spec.name), "{}", spec.name);
    }
}

#[test]
fn test_set_and_read_back() {
    let mut config = ConfigStore::default();
    config
        .set_input("exacerbation_rate", ConfigValue::Scalar(1.25))
        .unwrap();
    config
        .set_input("baseline_mean", ConfigValue::Vector(vec![50.0, 2.0, 30.0]))
        .unwrap();

    assert_eq!(
        config.inputs()["exacerbation_rate"],
        ConfigValue::Scalar(1.25)
    );
    assert_eq!(config.model_inputs().baseline_mean, vec![50.0, 2.0, 30.0]);
}

#[test]
fn test_unknown_key() {
    let mut config = ConfigStore::default();
    assert_eq!(
        config.set_input("mystery", ConfigValue::Scalar(1.0)),
        Err(ConfigError::UnknownKey("mystery".to_string()))
    );
}

#[test]
fn test_invalid_values() {
    let mut config = ConfigStore::default();
    let cases = [
        ("p_male", ConfigValue::Scalar(1.5)),
        ("p_male", ConfigValue::Scalar(f64::NAN)),
        ("p_male", ConfigValue::Vector(vec![0.5])),
        ("baseline_mean", ConfigValue::Scalar(60.0)),
        ("baseline_mean", ConfigValue::Vector(vec![60.0, 1.0])),
        ("hospital_capacity", ConfigValue::Scalar(2.5)),
        ("hospital_capacity", ConfigValue::Scalar(-1.0)),
        (
            "baseline_cov",
            ConfigValue::Vector(vec![1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
        ),
    ];
    for (key, value) in cases {
        assert!(
            matches!(
                config.set_input(key, value.clone()),
                Err(ConfigError::InvalidParameter { .. })
            ),
            "{} = {:?} should be rejected",
            key,
            value
        );
    }
    // Rejected writes leave the store unchanged
    assert_eq!(config, ConfigStore::default());
}

#[test]
fn test_fingerprint_tracks_values() {
    let a = ConfigStore::default();
    let mut b = ConfigStore::default();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint().len(), 64);

    b.set_input("p_male", ConfigValue::Scalar(0.6)).unwrap();
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn test_config_file_apply() {
    let file: ConfigFile = serde_json::from_str(
        r#"{
            "settings": { "population_size": 250, "seed": 7 },
            "inputs": { "hospital_capacity": 4, "baseline_mean": [55, 0.5, 25] }
        }"#,
    )
    .unwrap();

    let mut config = ConfigStore::default();
    config.apply(&file).unwrap();
    assert_eq!(config.run_settings().population_size, 250);
    assert_eq!(config.run_settings().seed, 7);
    assert_eq!(config.model_inputs().hospital_capacity, 4);
    assert_eq!(config.model_inputs().baseline_mean, vec![55.0, 0.5, 25.0]);
}

#[test]
fn test_config_file_rejects_unknown_key() {
    let file: ConfigFile = serde_json::from_str(r#"{ "inputs": { "nope": 1 } }"#).unwrap();
    let mut config = ConfigStore::default();
    assert!(matches!(config.apply(&file), Err(ConfigError::UnknownKey(_))));
}

#[test]
fn test_store_deserialization_is_validated() {
    let mut config = ConfigStore::default();
    config
        .set_setting("horizon_years", ConfigValue::Scalar(3.0))
        .unwrap();
    config
        .set_setting("population_size", ConfigValue::Scalar(15.0))
        .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let restored: ConfigStore = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, config);

    for bad in [
        r#"{ "settings": { "horizon_years": -1 } }"#,
        r#"{ "settings": { "horizon_years": 0 } }"#,
        r#"{ "inputs": { "baseline_cov": [1, 0, 0] } }"#,
        r#"{ "inputs": { "made_up": 1 } }"#,
    ] {
        assert!(
            serde_json::from_str::<ConfigStore>(bad).is_err(),
            "{} should be rejected",
            bad
        );
    }

    // Only validated stores reach a session, so a run never trips the clock
    let mut session = Session::with_config(restored);
    session.init_session();
    session.allocate_resources().unwrap();
    session.create_agents().unwrap();
    session.model(RunParams::default()).unwrap();
    let output = session.get_output().unwrap();
    assert_eq!(output.n_agents + output.n_failed, 15);
}

#[test]
fn test_session_locks_and_unlocks() {
    let mut session = Session::new();
    session
        .set_settings_var("population_size", ConfigValue::Scalar(10.0))
        .unwrap();
    session.init_session();
    session.allocate_resources().unwrap();

    assert!(matches!(
        session.set_settings_var("population_size", ConfigValue::Scalar(20.0)),
        Err(SessionError::SessionLocked(_))
    ));

    session.create_agents().unwrap();
    session.model(RunParams::default()).unwrap();
    assert!(matches!(
        session.set_input_var("p_male", ConfigValue::Scalar(0.2)),
        Err(SessionError::SessionLocked(_))
    ));

    // Configuration survives re-initialisation and becomes writable again
    session.init_session();
    assert_eq!(
        session.get_settings()["population_size"],
        ConfigValue::Scalar(10.0)
    );
    session
        .set_settings_var("population_size", ConfigValue::Scalar(20.0))
        .unwrap();
}

#[test]
fn test_session_maps_config_errors() {
    let mut session = Session::new();
    assert_eq!(
        session.set_input_var("nope", ConfigValue::Scalar(1.0)),
        Err(SessionError::UnknownKey("nope".to_string()))
    );
    assert!(matches!(
        session.set_settings_var("record_mode", ConfigValue::Scalar(3.0)),
        Err(SessionError::InvalidParameter(_))
    ));
}
