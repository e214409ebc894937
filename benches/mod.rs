use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    network::application::mqtt::client::bench_publish,
    network::application::mqtt::client::bench_poll_qos0,
    network::application::mqtt::client::bench_poll_qos1,
    network::application::mqtt::client::bench_publish_and_poll
);
criterion_main!(benches);
