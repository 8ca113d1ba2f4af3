use courier::config::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    assert!(cfg.rules.is_empty());
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
listen_addr: "0.0.0.0:3000"
rules:
  - path_prefix: /events
    target: http://webhook:5000
    change_origin: true
    secure: false
"#;

    let cfg = Config::from_yaml(yaml).unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.rules.len(), 1);

    let rule = &cfg.rules[0];
    assert_eq!(rule.path_prefix, "/events");
    assert_eq!(rule.target, "http://webhook:5000");
    assert!(rule.change_origin);
    assert!(!rule.secure);
}

#[test]
fn test_rule_field_defaults() {
    // change_origin defaults to false, secure defaults to true
    let yaml = r#"
rules:
  - path_prefix: /events
    target: http://webhook:5000
"#;

    let cfg = Config::from_yaml(yaml).unwrap();
    let rule = &cfg.rules[0];
    assert!(!rule.change_origin);
    assert!(rule.secure);
}

#[test]
fn test_listen_addr_defaults_when_omitted() {
    let yaml = r#"
rules: []
"#;

    let cfg = Config::from_yaml(yaml).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_missing_required_field_rejected() {
    let yaml = r#"
rules:
  - path_prefix: /events
"#;

    assert!(Config::from_yaml(yaml).is_err());
}

#[test]
fn test_listen_env_override() {
    unsafe {
        std::env::set_var("COURIER_CONFIG", "/nonexistent/courier.yaml");
        std::env::set_var("LISTEN", "0.0.0.0:4000");
    }

    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:4000");

    unsafe {
        std::env::remove_var("COURIER_CONFIG");
        std::env::remove_var("LISTEN");
    }
}
