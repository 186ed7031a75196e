use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rvoip_sdp_negotiation::{NegotiationConfig, NegotiationEngine, SessionDescription};
use std::sync::Arc;

const OFFER: &str = "v=0\r\no=- 1 1 IN IP4 192.0.2.1\r\ns=-\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\n\
    m=audio 5004 RTP/AVP 18 8 0 101\r\na=rtpmap:101 telephone-event/8000\r\na=fmtp:101 0-15\r\n\
    m=video 5006 RTP/AVP 97\r\na=rtpmap:97 H264/90000\r\na=fmtp:97 profile-level-id=42e01f\r\n";

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sdp_parse");
    group.throughput(Throughput::Bytes(OFFER.len() as u64));
    group.bench_function("offer", |b| {
        b.iter(|| SessionDescription::parse(black_box(OFFER.as_bytes())))
    });
    group.finish();
}

fn bench_answer(c: &mut Criterion) {
    let engine = Arc::new(NegotiationEngine::new(NegotiationConfig::default()).unwrap());
    let mut group = c.benchmark_group("negotiate_offer");
    for reoffers in [0usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(reoffers), &reoffers, |b, &reoffers| {
            b.iter(|| {
                let mut session = engine.new_session();
                session.negotiate_offer_sdp(Some(OFFER.as_bytes()), true).unwrap();
                for _ in 0..reoffers {
                    session.negotiate_offer_sdp(Some(OFFER.as_bytes()), false).unwrap();
                }
                let body = session.encode_sdp_and_update_version();
                session.release();
                black_box(body)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_answer);
criterion_main!(benches);
