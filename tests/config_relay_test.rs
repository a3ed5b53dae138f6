//! Configuration file + environment overrides driving relay construction

mod common;

use std::io::Write;
use std::sync::Arc;

use common::Ledger;
use pumpswap_relay::config::{Config, RelayKind};
use pumpswap_relay::relay::single::MIN_TIP_LAMPORTS;
use pumpswap_relay::{BundleRelay, RelayStrategy, SingleEndpointRelay};
use solana_sdk::pubkey::Pubkey;
use tempfile::NamedTempFile;

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn test_single_relay_from_file_and_env() {
    let file = write_config(
        r#"
[rpc]
url = "http://127.0.0.1:8899"
commitment = "processed"

[relay]
strategy = "single"
confirm_poll_ms = 250

[relay.single]
tip_lamports = 10
endpoints = [
    { url = "http://ams.relay.test/?c=", weight = 2 },
    { url = "http://fra.relay.test/?c=", weight = 0 },
]
"#,
    );

    let mut config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    config
        .apply_env_overrides(|key| match key {
            "NOZOMI_API_KEYS" => Some("alpha".to_string()),
            _ => None,
        })
        .unwrap();
    config.validate().unwrap();

    assert_eq!(config.relay.strategy, RelayKind::Single);
    assert_eq!(config.confirm_settings().poll_interval.as_millis(), 250);

    let relay = SingleEndpointRelay::new(
        Arc::new(Ledger::new()),
        reqwest::Client::new(),
        config.relay.single.endpoints.clone(),
        config.relay.single.api_keys.clone(),
        config.single_tip_accounts().unwrap(),
        config.relay.single.tip_lamports,
        config.confirm_settings(),
    )
    .unwrap();

    assert_eq!(relay.tip_lamports(), MIN_TIP_LAMPORTS);
    // The weight-0 endpoint is never chosen
    for _ in 0..20 {
        assert_eq!(relay.choose_target().unwrap(), "http://ams.relay.test/?c=alpha");
    }

    let payer = Pubkey::new_unique();
    let tip = relay.inline_tip(&payer).unwrap();
    let tip_accounts = config.single_tip_accounts().unwrap();
    assert!(tip_accounts.contains(&tip[0].accounts[1].pubkey));
}

#[test]
fn test_bundle_relay_from_defaults_with_fee_override() {
    let mut config = Config::default();
    config
        .apply_env_overrides(|key| match key {
            "JITO_FEE" => Some("0.0025".to_string()),
            _ => None,
        })
        .unwrap();
    config.validate().unwrap();
    assert_eq!(config.relay.bundle.tip_lamports, 2_500_000);

    let relay = BundleRelay::new(
        Arc::new(Ledger::new()),
        reqwest::Client::new(),
        config.relay.bundle.endpoints.clone(),
        config.bundle_tip_accounts().unwrap(),
        config.relay.bundle.tip_lamports,
        config.confirm_settings(),
    )
    .unwrap();

    assert_eq!(relay.name(), "bundle");
    // Bundles tip out of band
    assert!(relay.inline_tip(&Pubkey::new_unique()).unwrap().is_empty());
}

#[test]
fn test_relay_without_enabled_endpoints_is_rejected() {
    let file = write_config(
        r#"
[relay.bundle]
endpoints = [{ url = "http://a.test", weight = 0 }]
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert!(config.validate().is_err());

    assert!(BundleRelay::new(
        Arc::new(Ledger::new()),
        reqwest::Client::new(),
        config.relay.bundle.endpoints.clone(),
        config.bundle_tip_accounts().unwrap(),
        1,
        config.confirm_settings(),
    )
    .is_err());
}
