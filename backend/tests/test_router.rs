//! Tests for name-based dispatch of host calls

use hemsim_core::api::{dispatch, RouterError, CALLS};
use hemsim_core::{Session, SessionError};
use serde_json::{json, Value};

fn call(session: &mut Session, name: &str, args: &[Value]) -> Value {
    dispatch(session, name, args).unwrap_or_else(|e| panic!("{} failed: {}", name, e))
}

#[test]
fn test_full_lifecycle_by_name() {
    let mut s = Session::new();
    call(&mut s, "set_settings_var", &[json!("population_size"), json!(40)]);
    call(&mut s, "set_settings_var", &[json!("horizon_years"), json!(3)]);
    call(&mut s, "set_input_var", &[json!("hospital_capacity"), json!(5)]);

    let status = call(&mut s, "init_session", &[]);
    assert_eq!(status["state"], json!("Initialized"));

    let handles = call(&mut s, "allocate_resources", &[]);
    assert_eq!(handles.as_array().unwrap().len(), 3);

    assert_eq!(call(&mut s, "create_agents", &[]), json!(40));

    let run = call(&mut s, "Cmodel", &[Value::Null]);
    assert_eq!(run["agents_simulated"], json!(40));

    let n = call(&mut s, "get_n_events", &[]).as_u64().unwrap();
    assert!(n > 0);
    assert_eq!(
        call(&mut s, "get_all_events", &[]).as_array().unwrap().len() as u64,
        n
    );

    let event = call(&mut s, "get_event", &[json!(0)]);
    assert_eq!(event["event_type"], json!("Start"));

    let agent = call(&mut s, "get_agent", &[json!(3)]);
    assert_eq!(agent["id"], json!(3));

    let timeline = call(&mut s, "get_agent_events", &[json!(3)]);
    assert_eq!(timeline[0]["event_type"], json!("Start"));

    let starts = call(&mut s, "get_events_by_type", &[json!("Start")]);
    assert_eq!(starts.as_array().unwrap().len(), 40);

    let output = call(&mut s, "get_output", &[]);
    assert_eq!(output["bed_capacity"], json!(5));

    let ex = call(&mut s, "get_output_ex", &[]);
    assert_eq!(ex["agents"].as_array().unwrap().len(), 40);

    let stats = call(&mut s, "get_runtime_stats", &[]);
    assert_eq!(stats["events_recorded"].as_u64(), Some(n));

    let pointers = call(&mut s, "get_pointers", &[]);
    assert_eq!(pointers["n_agents"], json!(40));

    let teardown = call(&mut s, "deallocate_resources", &[]);
    assert_eq!(teardown["agents_freed"], json!(40));
    assert_eq!(call(&mut s, "get_n_events", &[]), json!(0));
}

#[test]
fn test_configuration_reads() {
    let mut s = Session::new();
    call(&mut s, "set_input_var", &[json!("baseline_mean"), json!([50, 1.5, 26])]);

    let inputs = call(&mut s, "get_inputs", &[]);
    assert_eq!(inputs["baseline_mean"], json!([50.0, 1.5, 26.0]));
    let settings = call(&mut s, "get_settings", &[]);
    assert_eq!(settings["seed"], json!(12345.0));
}

#[test]
fn test_matrix_encodes_missing_payload_as_null() {
    let mut s = Session::new();
    call(&mut s, "set_settings_var", &[json!("population_size"), json!(2)]);
    call(&mut s, "init_session", &[]);
    call(&mut s, "allocate_resources", &[]);
    call(&mut s, "create_agents", &[]);
    call(&mut s, "Cmodel", &[json!(1)]);

    let matrix = call(&mut s, "get_all_events_matrix", &[]);
    assert_eq!(matrix["columns"][0], json!("agent_id"));
    // Start has no payload; NaN is not representable in JSON
    assert_eq!(matrix["rows"][0][3], Value::Null);
}

#[test]
fn test_sampler_calls() {
    let mut s = Session::new();
    call(&mut s, "init_session", &[]);

    let draws = call(
        &mut s,
        "mvrnormArma",
        &[json!([0.0, 10.0]), json!([[1.0, 0.0], [0.0, 4.0]]), json!(6)],
    );
    let draws = draws.as_array().unwrap();
    assert_eq!(draws.len(), 6);
    assert!(draws.iter().all(|row| row.as_array().unwrap().len() == 2));

    let exp = call(&mut s, "Xrexp", &[json!([2.0]), json!(5)]);
    assert!(exp
        .as_array()
        .unwrap()
        .iter()
        .all(|v| v.as_f64().unwrap() >= 0.0));

    let smith = call(&mut s, "get_smith", &[]);
    assert!(smith["draws"].as_u64().unwrap() > 0);
}

#[test]
fn test_sample_output_by_name() {
    let mut s = Session::new();
    call(&mut s, "set_settings_var", &[json!("population_size"), json!(20)]);
    call(&mut s, "set_settings_var", &[json!("horizon_years"), json!(2)]);

    let by_name = call(&mut s, "get_sample_output", &[json!("deaths"), json!(3)]);
    assert_eq!(by_name["seeds"], json!([12345, 12346, 12347]));

    let by_object = call(
        &mut s,
        "get_sample_output",
        &[json!({"statistic": "deaths", "base_seed": 12345}), json!(3)],
    );
    assert_eq!(by_name, by_object);
}

#[test]
fn test_invalid_covariance_surfaces_session_error() {
    let mut s = Session::new();
    let err = dispatch(
        &mut s,
        "mvrnormArma",
        &[json!([0.0, 0.0]), json!([[1.0, 2.0], [2.0, 1.0]]), json!(1)],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Session(SessionError::InvalidCovariance(_))
    ));
}

fn is_rejected_count(err: &RouterError) -> bool {
    matches!(
        err,
        RouterError::BadArgument { index: 1, .. }
            | RouterError::BadArgument { index: 2, .. }
            | RouterError::Session(SessionError::InvalidParameter(_))
    )
}

#[test]
fn test_huge_counts_are_rejected() {
    let mut s = Session::new();
    call(&mut s, "init_session", &[]);
    let huge = json!(u64::MAX / 2);

    let err = dispatch(&mut s, "Xrexp", &[json!([1.0]), huge.clone()]).unwrap_err();
    assert!(is_rejected_count(&err), "{:?}", err);

    let err = dispatch(
        &mut s,
        "mvrnormArma",
        &[json!([0.0, 0.0]), json!([[1.0, 0.0], [0.0, 1.0]]), huge.clone()],
    )
    .unwrap_err();
    assert!(is_rejected_count(&err), "{:?}", err);

    let err = dispatch(&mut s, "get_sample_output", &[json!("mean_cost"), huge]).unwrap_err();
    assert!(is_rejected_count(&err), "{:?}", err);

    // Nothing was drawn and the session is still usable
    let smith = call(&mut s, "get_smith", &[]);
    assert_eq!(smith["draws"], json!(0));
    let draws = call(&mut s, "Xrexp", &[json!([1.0]), json!(3)]);
    assert_eq!(draws.as_array().unwrap().len(), 3);
}

#[test]
fn test_unknown_call_and_arity() {
    let mut s = Session::new();
    assert_eq!(
        dispatch(&mut s, "Cmodel2", &[]),
        Err(RouterError::UnknownCall("Cmodel2".to_string()))
    );
    assert!(matches!(
        dispatch(&mut s, "Xrexp", &[json!([1.0])]),
        Err(RouterError::Arity {
            expected: 2,
            got: 1,
            ..
        })
    ));
}

#[test]
fn test_every_call_is_routable() {
    // Calling each name with the right arity never yields UnknownCall
    for (name, arity) in CALLS {
        let mut s = Session::new();
        let args = vec![Value::Null; *arity];
        let result = dispatch(&mut s, name, &args);
        assert!(
            !matches!(result, Err(RouterError::UnknownCall(_))),
            "{} is listed but not routed",
            name
        );
    }
}

#[test]
fn test_bad_config_value() {
    let mut s = Session::new();
    let err = dispatch(&mut s, "set_input_var", &[json!("p_male"), json!("half")]).unwrap_err();
    assert!(matches!(err, RouterError::BadArgument { index: 1, .. }));

    let err = dispatch(&mut s, "set_input_var", &[json!("p_male"), json!(2.0)]).unwrap_err();
    assert!(matches!(
        err,
        RouterError::Session(SessionError::InvalidParameter(_))
    ));
}
