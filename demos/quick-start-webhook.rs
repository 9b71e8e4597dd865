//! # Univapay Webhooks - Quick Start Example
//!
//! Signs a sample delivery, verifies and parses it, then dispatches it to a
//! couple of handlers.
//!
//! Run with: `cargo run --example quick-start-webhook`

use serde_json::{json, Value};
use univapay_webhooks::webhook::LoggingHandler;
use univapay_webhooks::{
    sign_payload, verify_and_parse, SignatureScheme, WebhookConfig, WebhookRouter,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Univapay Webhooks - Quick Start");
    println!();

    let secret = "whsec_demo";
    let config = WebhookConfig::new(secret);

    // Register handlers once at startup
    let mut router = WebhookRouter::new();
    router
        .on_named("charge.successful", "fulfil-order", |event| {
            let amount = event
                .object()
                .and_then(|charge| charge.get("chargedAmount"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(json!({"fulfilled": event.id, "amount": amount}))
        })?
        .on_named("charge.successful", "flaky-crm-sync", |_| {
            anyhow::bail!("CRM unreachable")
        })?
        .register("*", LoggingHandler)?;

    // What Univapay would send
    let body = json!({
        "type": "charge.successful",
        "id": "evt_demo_1",
        "mode": "test",
        "data": {"id": "ch_demo", "chargedAmount": 1200, "chargedCurrency": "JPY"},
    })
    .to_string();
    let signature = sign_payload(secret, body.as_bytes(), SignatureScheme::Timestamped, None);
    let headers = [("X-Univapay-Signature", signature.as_str())];
    println!("Signature header: {signature}");

    let (info, event) = verify_and_parse(body.as_bytes(), &headers, &config)?;
    if let Some(info) = &info {
        println!("Verified via {} ({})", info.header(), info.scheme());
    }
    let kind = event.kind();
    println!(
        "Event {} [{}] terminal={}",
        event.id,
        kind.as_str(),
        kind.is_terminal()
    );
    println!();

    for outcome in router.dispatch(&event) {
        match &outcome.result {
            Ok(value) => println!("  ok    {:<16} -> {value}", outcome.handler),
            Err(failure) => println!("  error {:<16} -> {}", outcome.handler, failure.message),
        }
    }

    // Tampered body is rejected before parsing
    let tampered = body.replace("1200", "1");
    match verify_and_parse(tampered.as_bytes(), &headers, &config) {
        Ok(_) => println!("\nunexpected: tampered body accepted"),
        Err(err) => println!("\nTampered body rejected: {err}"),
    }

    Ok(())
}
