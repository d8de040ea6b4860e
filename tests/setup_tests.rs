mod common;

use common::{RecordingHandler, Row, TestDatabase, block, create_test_query};
use sqlzone::dns::enums::{DNSResourceType, ResponseCode};
use sqlzone::{ConfigError, Handler, HandlerChain, SetupError, SqlBackend, SqlConfig, SqlPlugin, setup};
use std::time::Duration;

fn zone_rows() -> Vec<Row<'static>> {
    vec![
        Row {
            zone: "example.com.",
            name: "www",
            ttl: None,
            content: r#"{"ip": "192.0.2.10"}"#,
            record_type: "A",
        },
        Row {
            zone: "example.com.",
            name: "@",
            ttl: Some(3600),
            content: r#"{"host": "mail.example.com.", "preference": 10}"#,
            record_type: "MX",
        },
        Row {
            zone: "example.com.",
            name: "ftp",
            ttl: Some(0),
            content: r#"{"host": "www.example.com."}"#,
            record_type: "CNAME",
        },
    ]
}

/// Chain of the sqlite3 plugin followed by a recorder
async fn chain_with(block: &str) -> (Box<dyn Handler>, RecordingHandler) {
    let mut chain = HandlerChain::new();
    setup(block, &mut chain).await.unwrap();
    assert_eq!(chain.len(), 1);

    let recorder = RecordingHandler::new();
    let next = recorder.clone();
    chain.add_plugin(move |_end| Box::new(next));
    (chain.build(), recorder)
}

#[tokio::test]
async fn test_setup_serves_records_with_default_ttl() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, recorder) = chain_with(&block(&db.dsn(), &["ttl 120"])).await;

    let response = handler
        .serve_dns(&create_test_query("www.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.header.id, 1234);
    assert!(response.header.qr);
    assert!(response.header.aa);
    assert_eq!(response.rcode(), ResponseCode::NoError as u8);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].ttl, 120);
    assert_eq!(response.answers[0].rdata, vec![192, 0, 2, 10]);

    let mx = handler
        .serve_dns(&create_test_query("example.com", DNSResourceType::MX))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mx.answers[0].ttl, 3600);

    assert_eq!(recorder.calls(), 0);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_unset_ttl_uses_builtin_default() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, _recorder) = chain_with(&block(&db.dsn(), &[])).await;

    let response = handler
        .serve_dns(&create_test_query("ftp.example.com", DNSResourceType::CNAME))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.answers[0].ttl, 300);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_missing_records_pass_to_next() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, recorder) = chain_with(&block(&db.dsn(), &[])).await;

    let response = handler
        .serve_dns(&create_test_query("nothing.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.rcode(), ResponseCode::NameError as u8);

    handler
        .serve_dns(&create_test_query("www.example.org", DNSResourceType::A))
        .await
        .unwrap();
    assert_eq!(recorder.calls(), 2);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_custom_table_prefix() {
    let db = TestDatabase::create("dns_records", &zone_rows()).await;
    let (handler, recorder) = chain_with(&block(&db.dsn(), &["table_prefix dns_"])).await;

    let response = handler
        .serve_dns(&create_test_query("www.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert!(response.header.aa);
    assert_eq!(recorder.calls(), 0);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_missing_dsn_argument_registers_nothing() {
    let mut chain = HandlerChain::new();
    let result = setup("sqlite3 {\n    dsn\n}\n", &mut chain).await;

    assert!(matches!(
        result,
        Err(SetupError::Config(ConfigError::MissingArgument { ref directive, .. })) if directive == "dsn"
    ));
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_unknown_property_registers_nothing() {
    let mut chain = HandlerChain::new();
    let result = setup("sqlite3 {\n    dsn zones.db\n    cache 30\n}\n", &mut chain).await;

    assert!(matches!(
        result,
        Err(SetupError::Config(ConfigError::UnknownProperty { ref token, .. })) if token == "cache"
    ));
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_unreachable_database_registers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing").join("zones.db");
    let mut chain = HandlerChain::new();

    let result = setup(&block(&missing.display().to_string(), &[]), &mut chain).await;
    assert!(matches!(result, Err(SetupError::Connectivity(_))));
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_rejected_dsn_registers_nothing() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let mut chain = HandlerChain::new();

    let dsn = format!("{}?flavour=vanilla", db.dsn());
    let result = setup(&block(&dsn, &[]), &mut chain).await;
    assert!(matches!(result, Err(SetupError::Connection(_))));
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_missing_table_fails_initial_zone_load() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let mut chain = HandlerChain::new();

    let result = setup(&block(&db.dsn(), &["table_prefix other_"]), &mut chain).await;
    assert!(matches!(result, Err(SetupError::Store(_))));
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_dsn_expands_environment() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let var = format!("SQLZONE_TEST_DIR_{}", std::process::id());
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var(&var, db.dir()) };

    let dsn = format!("${{{}}}/zones.db", var);
    let (handler, _recorder) = chain_with(&block(&dsn, &[])).await;
    let response = handler
        .serve_dns(&create_test_query("www.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.answers.len(), 1);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_bad_values_fall_back_to_defaults() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let config = SqlConfig::parse(&block(
        &db.dsn(),
        &[
            "max_lifetime notaduration",
            "ttl -5",
            "zone_update_interval 0",
        ],
    ))
    .unwrap();
    assert_eq!(config.max_lifetime, Duration::from_secs(60));
    assert_eq!(config.fallbacks.len(), 2);

    let backend = SqlBackend::open(config).await.unwrap();
    let text = backend.metrics().export().unwrap();
    assert!(text.contains("sqlzone_config_fallbacks_total 2"));
}

#[tokio::test]
async fn test_refresh_picks_up_new_zones() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, recorder) =
        chain_with(&block(&db.dsn(), &["zone_update_interval 50ms"])).await;

    let query = create_test_query("www.example.net", DNSResourceType::A);
    handler.serve_dns(&query).await.unwrap();
    assert_eq!(recorder.calls(), 1);

    db.insert(
        "coredns_records",
        Row {
            zone: "example.net.",
            name: "www",
            ttl: Some(30),
            content: r#"{"ip": "198.51.100.7"}"#,
            record_type: "A",
        },
    )
    .await;

    let mut answered = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = handler.serve_dns(&query).await.unwrap().unwrap();
        if response.header.aa {
            answered = Some(response);
            break;
        }
    }
    let response = answered.expect("new zone was never served");
    assert_eq!(response.answers[0].ttl, 30);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_store_failure_answers_servfail() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, recorder) = chain_with(&block(&db.dsn(), &["zone_update_interval 0"])).await;

    db.execute("DROP TABLE coredns_records").await;
    let response = handler
        .serve_dns(&create_test_query("www.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.rcode(), ResponseCode::ServerFailure as u8);
    assert_eq!(recorder.calls(), 0);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_store_failure_falls_through_when_configured() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let (handler, recorder) = chain_with(&block(
        &db.dsn(),
        &["zone_update_interval 0", "on_store_error fallthrough"],
    ))
    .await;

    db.execute("DROP TABLE coredns_records").await;
    let response = handler
        .serve_dns(&create_test_query("www.example.com", DNSResourceType::A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.rcode(), ResponseCode::NameError as u8);
    assert_eq!(recorder.calls(), 1);
    handler.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_pool() {
    let db = TestDatabase::create("coredns_records", &zone_rows()).await;
    let config = SqlConfig::parse(&block(&db.dsn(), &[])).unwrap();
    let backend = SqlBackend::open(config).await.unwrap();
    let plugin = SqlPlugin::new(backend, Box::new(RecordingHandler::new()));

    assert!(!plugin.backend().database().unwrap().is_closed());
    plugin.shutdown().await;
    assert!(plugin.backend().database().unwrap().is_closed());
}
