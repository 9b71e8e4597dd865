use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use univapay_webhooks::webhook::{parse_unverified, SignatureVerifier};
use univapay_webhooks::{sign_payload, SignatureScheme, WebhookRouter};

const SECRET: &str = "whsec_bench";
const NOW: i64 = 1_700_000_000;

fn payload(items: usize) -> Vec<u8> {
    let lines: Vec<Value> = (0..items)
        .map(|i| json!({"sku": format!("sku-{i}"), "amount": i * 100, "currency": "JPY"}))
        .collect();
    json!({
        "type": "charge.successful",
        "id": "evt_bench",
        "data": {"id": "ch_bench", "items": lines},
    })
    .to_string()
    .into_bytes()
}

fn benchmark_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    let verifier = SignatureVerifier::new(SECRET);

    for items in [1, 100] {
        let body = payload(items);
        for scheme in [SignatureScheme::Timestamped, SignatureScheme::Sha256, SignatureScheme::Sha1] {
            let value = sign_payload(SECRET, &body, scheme, Some(NOW));
            let headers = [("X-Univapay-Signature", value.as_str())];

            group.bench_with_input(
                BenchmarkId::new(scheme.as_str(), body.len()),
                &body,
                |b, body| {
                    b.iter(|| verifier.verify_at(black_box(body), &headers, NOW).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn benchmark_parse_and_dispatch(c: &mut Criterion) {
    let body = payload(20);
    let mut router = WebhookRouter::new();
    router.on("charge.successful", |e| Ok(json!(e.id))).unwrap();
    router.on("*", |_| Ok(Value::Null)).unwrap();

    c.bench_function("parse_unverified", |b| {
        b.iter(|| parse_unverified(black_box(&body)).unwrap());
    });

    let event = parse_unverified(&body).unwrap();
    c.bench_function("dispatch", |b| {
        b.iter(|| router.dispatch(black_box(&event)));
    });
}

criterion_group!(benches, benchmark_verify, benchmark_parse_and_dispatch);
criterion_main!(benches);
