use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use agrisense::control::command_channel::ActuatorCommand;
use agrisense::ingest::codec::{self, SensorChannel};

fn decode_bench(c: &mut Criterion) {
    let light = codec::encode_reading(SensorChannel::Light, 142.5);
    let moisture = codec::encode_reading(SensorChannel::Moisture, 2_048.0);

    c.bench_function("decode_light_f32", |b| {
        b.iter(|| codec::decode(SensorChannel::Light, black_box(&light)))
    });
    c.bench_function("decode_moisture_i16", |b| {
        b.iter(|| codec::decode(SensorChannel::Moisture, black_box(&moisture)))
    });
}

fn encode_bench(c: &mut Criterion) {
    let command = ActuatorCommand::new(80);
    c.bench_function("encode_brightness", |b| b.iter(|| codec::encode(black_box(&command))));
}

criterion_group!(benches, decode_bench, encode_bench);
criterion_main!(benches);
