use criterion::{black_box, criterion_group, criterion_main, Criterion};
use echonet_rs::frame::{decode, encode, ServiceCode};
use echonet_rs::object::ObjectIdentifier;
use echonet_rs::property::{Property, PropertyCode};

const AIRCON: ObjectIdentifier = ObjectIdentifier::new(0x01, 0x30, 0x01);

fn essential_request() -> Vec<Property> {
    [
        PropertyCode::OperationStatus,
        PropertyCode::OperationMode,
        PropertyCode::TemperatureSetting,
        PropertyCode::AirFlowRate,
    ]
    .into_iter()
    .map(Property::request)
    .collect()
}

fn encode_benchmark(c: &mut Criterion) {
    let properties = essential_request();
    c.bench_function("encode_get_request", |b| {
        b.iter(|| encode(black_box(42), AIRCON, ServiceCode::Get, black_box(&properties)))
    });

    let large = vec![Property::new(PropertyCode::from(0xF0u8), vec![0xAA; 255]).unwrap(); 5];
    c.bench_function("encode_large_set_request", |b| {
        b.iter(|| encode(black_box(42), AIRCON, ServiceCode::SetC, black_box(&large)))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let response = [
        0x10, 0x81, 0x00, 0x2A, 0x01, 0x30, 0x01, 0x05, 0xFF, 0x01, 0x72, 0x04, 0x80, 0x01, 0x30,
        0xB0, 0x01, 0x42, 0xB3, 0x01, 0x1A, 0xA0, 0x01, 0x41,
    ];
    c.bench_function("decode_get_response", |b| {
        b.iter(|| decode(black_box(&response)))
    });

    let truncated = &response[..response.len() - 2];
    c.bench_function("decode_truncated_response", |b| {
        b.iter(|| decode(black_box(truncated)))
    });
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
